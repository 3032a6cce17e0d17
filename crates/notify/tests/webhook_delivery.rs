//! Webhook channels against a mock HTTP server.

use std::sync::Arc;

use notify::{summarize, Notification, Notifier, NotifyChannel, Severity, SlackChannel, TeamsChannel};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn slack_posts_blocks_and_severity_color() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/slack"))
        .and(body_partial_json(json!({
            "text": "redis is crashlooping",
            "attachments": [{ "color": "#ffd700" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let channel = SlackChannel::new(format!("{}/slack", server.uri()));
    let result = channel
        .send(
            &Notification::new("redis is crashlooping")
                .with_title("Pod failure")
                .with_severity(Severity::Warning),
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn teams_rejection_is_reported_as_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad card"))
        .mount(&server)
        .await;

    let channel = TeamsChannel::new(format!("{}/teams", server.uri()));
    let err = channel
        .send(&Notification::new("hello"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("400"));
    assert!(err.to_string().contains("bad card"));
}

#[tokio::test]
async fn one_failing_webhook_does_not_block_the_other() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let channels: Vec<Arc<dyn NotifyChannel>> = vec![
        Arc::new(TeamsChannel::new(format!("{}/teams", server.uri()))),
        Arc::new(SlackChannel::new(format!("{}/slack", server.uri()))),
    ];
    let notifier = Notifier::with_channels(channels);

    let outcomes = notifier
        .notify(
            &Notification::new("etcd latency high").with_severity(Severity::parse("bogus")),
            None,
        )
        .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes["slack"]);
    assert!(!outcomes["teams"]);
    assert_eq!(summarize(&outcomes), "Notification sent successfully to: slack");
}

#[tokio::test]
async fn unreachable_webhook_is_a_failed_outcome() {
    // Nothing listens on port 9 (discard) in the test environment.
    let channels: Vec<Arc<dyn NotifyChannel>> =
        vec![Arc::new(SlackChannel::new("http://127.0.0.1:9/hook"))];
    let notifier = Notifier::with_channels(channels);

    let outcomes = notifier.notify(&Notification::new("x"), None).await;

    assert_eq!(outcomes.get("slack"), Some(&false));
}
