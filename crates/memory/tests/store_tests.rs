//! Integration tests for the incident store.

use incident_memory::{
    Embedder, EmbeddingError, HashingEmbedder, HttpEmbedder, IncidentStore, MemoryError, Metadata,
    StoreConfig,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn hashing() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::default())
}

async fn open_store(dir: &TempDir) -> IncidentStore {
    IncidentStore::open(StoreConfig::new(dir.path()), hashing())
        .await
        .unwrap()
}

/// Embedder that always fails, for exercising the error paths.
struct BrokenEmbedder;

#[async_trait::async_trait]
impl Embedder for BrokenEmbedder {
    fn model_id(&self) -> &str {
        "local-hashing-384"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Empty)
    }
}

#[tokio::test]
async fn test_add_then_find_crashloop() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let id = store
        .add(
            "pod crashlooping due to bad command",
            "fix the container command",
            Metadata::new(),
        )
        .await
        .unwrap();
    assert_eq!(id, "problem_1");

    let hits = store
        .find_similar("pod in CrashLoopBackOff", 5, 0.3)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "problem_1");
    assert_eq!(hits[0].solution, "fix the container command");
    assert!(hits[0].similarity >= 0.3 && hits[0].similarity <= 1.0);
}

#[tokio::test]
async fn test_exact_query_matches_itself() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store
        .add("node disk pressure on worker-2", "prune images", Metadata::new())
        .await
        .unwrap();
    store
        .add("certificate expired for ingress", "renew via cert-manager", Metadata::new())
        .await
        .unwrap();

    let hits = store
        .find_similar("node disk pressure on worker-2", 1, 0.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "problem_1");
    assert!((hits[0].similarity - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_results_are_ordered_and_bounded() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    for (problem, solution) in [
        ("redis pod OOMKilled", "raise memory limit"),
        ("redis pod OOMKilled after upgrade", "roll back redis chart"),
        ("dns resolution failing in kube-system", "restart coredns"),
        ("pvc stuck pending", "fix storage class"),
    ] {
        store.add(problem, solution, Metadata::new()).await.unwrap();
    }

    let hits = store
        .find_similar("redis pod OOMKilled", 2, 0.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "problem_1");
    assert!(hits[0].similarity >= hits[1].similarity);
}

#[tokio::test]
async fn test_higher_threshold_never_returns_more() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    for problem in [
        "ImagePullBackOff for private registry",
        "image pull failing with 401",
        "node NotReady after kernel update",
        "HPA not scaling deployment",
    ] {
        store.add(problem, "see runbook", Metadata::new()).await.unwrap();
    }

    let mut previous = usize::MAX;
    for threshold in [0.0, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0] {
        let hits = store
            .find_similar("image pull backoff", 10, threshold)
            .await
            .unwrap();
        assert!(hits.len() <= previous, "threshold {threshold} grew results");
        assert!(hits.iter().all(|h| h.similarity >= threshold));
        previous = hits.len();
    }
}

#[tokio::test]
async fn test_empty_store_returns_nothing_without_embedding() {
    let dir = TempDir::new().unwrap();
    let store = IncidentStore::open(StoreConfig::new(dir.path()), Arc::new(BrokenEmbedder))
        .await
        .unwrap();

    let hits = store.find_similar("anything", 3, 0.7).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_invalid_arguments_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    assert!(matches!(
        store.find_similar("q", 0, 0.5).await,
        Err(MemoryError::InvalidInput(_))
    ));
    assert!(matches!(
        store.find_similar("q", 3, 1.5).await,
        Err(MemoryError::InvalidInput(_))
    ));
    assert!(matches!(
        store.find_similar("   ", 3, 0.5).await,
        Err(MemoryError::InvalidInput(_))
    ));
    assert!(matches!(
        store.add("  ", "solution", Metadata::new()).await,
        Err(MemoryError::InvalidInput(_))
    ));

    let mut nested = Metadata::new();
    nested.insert("labels".to_string(), json!(["a", "b"]));
    assert!(matches!(
        store.add("problem", "solution", nested).await,
        Err(MemoryError::InvalidInput(_))
    ));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_failed_embedding_is_a_write_error_and_leaves_store_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = IncidentStore::open(StoreConfig::new(dir.path()), Arc::new(BrokenEmbedder))
        .await
        .unwrap();

    let err = store
        .add("etcd leader changes", "check disk latency", Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Write(_)));
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn test_ids_are_never_reused() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let first = store.add("a failing job", "fix it", Metadata::new()).await.unwrap();
    let second = store.add("another failing job", "fix it", Metadata::new()).await.unwrap();
    assert_eq!((first.as_str(), second.as_str()), ("problem_1", "problem_2"));

    assert!(store.delete("problem_2").await.unwrap());
    assert!(!store.delete("problem_2").await.unwrap());

    let third = store.add("third failing job", "fix it", Metadata::new()).await.unwrap();
    assert_eq!(third, "problem_3");

    drop(store);
    let reopened = open_store(&dir).await;
    let fourth = reopened.add("fourth failing job", "fix it", Metadata::new()).await.unwrap();
    assert_eq!(fourth, "problem_4");
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir).await;
        let mut metadata = Metadata::new();
        metadata.insert("namespace".to_string(), json!("payments"));
        metadata.insert("restarts".to_string(), json!(12));
        store
            .add("payments api crashlooping", "restore missing secret", metadata)
            .await
            .unwrap();
    }

    let store = open_store(&dir).await;
    let all = store.list_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "problem_1");
    assert_eq!(all[0].metadata["namespace"], json!("payments"));
    assert_eq!(all[0].metadata["restarts"], json!(12));

    let record = store.get("problem_1").await.unwrap();
    assert_eq!(record.solution, "restore missing secret");
    assert!(store.get("problem_9").await.is_none());
}

#[tokio::test]
async fn test_clear_all_empties_and_restarts_numbering() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store.add("one", "fix", Metadata::new()).await.unwrap();
    store.add("two", "fix", Metadata::new()).await.unwrap();
    store.clear_all().await.unwrap();

    assert!(store.is_empty().await);
    assert!(store.list_all().await.is_empty());
    assert!(store.path().exists());

    let id = store.add("three", "fix", Metadata::new()).await.unwrap();
    assert_eq!(id, "problem_1");
}

#[tokio::test]
async fn test_failed_clear_does_not_resurrect_records() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    store.add("one", "fix", Metadata::new()).await.unwrap();
    store.add("two", "fix", Metadata::new()).await.unwrap();

    // A directory where the temp file goes makes the rewrite fail after the old file is removed
    let blocker = dir.path().join("k8s_problems.json.tmp");
    std::fs::create_dir(&blocker).unwrap();

    assert!(matches!(store.clear_all().await, Err(MemoryError::Write(_))));
    assert!(store.is_empty().await);
    assert!(!store.path().exists());

    std::fs::remove_dir(&blocker).unwrap();
    let id = store.add("three", "fix", Metadata::new()).await.unwrap();
    assert_eq!(id, "problem_1");

    drop(store);
    let reopened = open_store(&dir).await;
    let records = reopened.list_all().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].problem_description, "three");
}

#[tokio::test]
async fn test_query_without_words_matches_nothing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store
        .add("pod in CrashLoopBackOff", "fix the image", Metadata::new())
        .await
        .unwrap();

    let hits = store.find_similar("?!...", 5, 0.0).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_collections_are_isolated_by_name() {
    let dir = TempDir::new().unwrap();
    let prod = IncidentStore::open(StoreConfig::new(dir.path()).with_collection("prod"), hashing())
        .await
        .unwrap();
    let staging =
        IncidentStore::open(StoreConfig::new(dir.path()).with_collection("staging"), hashing())
            .await
            .unwrap();

    prod.add("ingress 502s", "scale backend", Metadata::new()).await.unwrap();

    assert_eq!(prod.len().await, 1);
    assert!(staging.is_empty().await);
}

#[tokio::test]
async fn test_reopen_with_other_model_is_rejected() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir).await;
        store.add("x", "y", Metadata::new()).await.unwrap();
    }

    let other: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
    let err = IncidentStore::open(StoreConfig::new(dir.path()), other)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::ModelMismatch { .. }));
}

#[tokio::test]
async fn test_http_embedder_parses_openai_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "node NotReady"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.6, 0.8, 0.0]}],
            "model": "text-embedding-3-small"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(format!("{}/v1/", server.uri()), "text-embedding-3-small")
        .with_api_key("sk-test");
    let vector = embedder.embed("node NotReady").await.unwrap();

    assert_eq!(vector, vec![0.6, 0.8, 0.0]);
    assert_eq!(embedder.model_id(), "text-embedding-3-small");
}

#[tokio::test]
async fn test_http_embedder_surfaces_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(server.uri(), "text-embedding-3-small");
    match embedder.embed("anything").await {
        Err(EmbeddingError::Rejected { status, body }) => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
