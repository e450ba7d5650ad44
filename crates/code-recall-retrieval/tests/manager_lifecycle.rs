//! End-to-end lifecycle of the retrieval manager: cold-start ingestion,
//! querying, unload, re-initialization from the backup ledger, and failure
//! recovery.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use code_recall_retrieval::{
    CapabilityStatus, EmbedError, EmbeddingProvider, ProviderFactory, RetrievalConfig,
    RetrievalError, RetrievalManager,
};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

const DIM: usize = 4;

/// Keyword provider: maps texts to near-orthogonal axes so ranking is
/// fully predictable in tests.
struct KeywordProvider;

impl EmbeddingProvider for KeywordProvider {
    fn dimension(&self) -> usize {
        DIM
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIM];
                if text.contains("cube") {
                    v[0] = 1.0;
                } else if text.contains("sphere") {
                    v[1] = 1.0;
                } else if text.contains("cone") {
                    v[2] = 1.0;
                } else {
                    v[3] = 1.0;
                }
                v
            })
            .collect())
    }
}

fn keyword_factory() -> ProviderFactory {
    Box::new(|| Ok(Arc::new(KeywordProvider) as Arc<dyn EmbeddingProvider>))
}

fn write_dataset(dir: &Path, ids: &[&str]) {
    let mut objects = Vec::new();
    for id in ids {
        fs::write(dir.join(format!("{id}.txt")), format!("a {id} shape")).unwrap();
        fs::write(dir.join(format!("{id}.py")), format!("make_{id}()")).unwrap();
        objects.push(json!({
            "id": id,
            "category": "primitives",
            "subcategory": "mesh",
            "description_file": format!("{id}.txt"),
            "code_file": format!("{id}.py"),
        }));
    }
    fs::write(
        dir.join("dataset.json"),
        serde_json::to_vec_pretty(&json!({ "objects": objects })).unwrap(),
    )
    .unwrap();
}

fn config(dir: &Path) -> RetrievalConfig {
    RetrievalConfig {
        collection_name: "templates".to_string(),
        vector_name: "template_embeddings".to_string(),
        embedding_dimension: DIM,
        backup_root: dir.join("backups"),
        dataset_manifest: dir.join("dataset.json"),
        dataset_base_dir: dir.to_path_buf(),
        ..RetrievalConfig::default()
    }
}

#[test]
fn cold_start_ingests_and_answers_queries() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), &["cube", "sphere", "cone"]);

    let manager =
        RetrievalManager::new(config(dir.path()), CapabilityStatus::Ready, keyword_factory())
            .unwrap();

    let hits = manager.query("give me a cube", 1).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.get("id").unwrap(), &json!("cube"));
    assert_eq!(hits[0].metadata.get("code").unwrap(), &json!("make_cube()"));
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!(manager.is_ready());
    assert!(manager.last_error().is_none());

    // k bounds the result count, not the collection size.
    let hits = manager.query("sphere please", 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].metadata.get("id").unwrap(), &json!("sphere"));
}

#[test]
fn reinitialization_restores_from_backup_with_same_ids() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), &["cube", "sphere"]);

    let id_set = |manager: &RetrievalManager| -> BTreeSet<Uuid> {
        manager
            .query("cube sphere cone", 10)
            .unwrap()
            .into_iter()
            .map(|hit| hit.id)
            .collect()
    };

    let manager =
        RetrievalManager::new(config(dir.path()), CapabilityStatus::Ready, keyword_factory())
            .unwrap();
    manager.ensure_initialized().unwrap();
    let original_ids = id_set(&manager);
    assert_eq!(original_ids.len(), 2);
    manager.unload();
    drop(manager);

    // Delete the dataset: the second manager must come up from the ledger,
    // not by re-ingesting.
    fs::remove_file(dir.path().join("dataset.json")).unwrap();

    let manager =
        RetrievalManager::new(config(dir.path()), CapabilityStatus::Ready, keyword_factory())
            .unwrap();
    manager.ensure_initialized().unwrap();
    assert_eq!(id_set(&manager), original_ids);
}

#[test]
fn initialization_failure_is_not_sticky() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), &["cube"]);

    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();
    let flaky: ProviderFactory = Box::new(move || {
        if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(EmbedError::new("model weights not downloaded yet"))
        } else {
            Ok(Arc::new(KeywordProvider) as Arc<dyn EmbeddingProvider>)
        }
    });

    let manager =
        RetrievalManager::new(config(dir.path()), CapabilityStatus::Ready, flaky).unwrap();

    let err = manager.query("cube", 1).unwrap_err();
    assert!(matches!(err, RetrievalError::Initialization(_)));
    assert!(!manager.is_ready());
    assert!(manager
        .last_error()
        .unwrap()
        .contains("model weights not downloaded yet"));

    // Second attempt succeeds and clears the recorded error.
    let hits = manager.query("cube", 1).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(manager.last_error().is_none());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_first_calls_construct_the_provider_once() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), &["cube"]);

    let constructions = Arc::new(AtomicUsize::new(0));
    let constructions_clone = constructions.clone();
    let counting: ProviderFactory = Box::new(move || {
        constructions_clone.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(KeywordProvider) as Arc<dyn EmbeddingProvider>)
    });

    let manager = Arc::new(
        RetrievalManager::new(config(dir.path()), CapabilityStatus::Ready, counting).unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            std::thread::spawn(move || manager.ensure_initialized())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

#[test]
fn malformed_dataset_entries_do_not_block_ingestion() {
    let dir = TempDir::new().unwrap();
    write_dataset(dir.path(), &["cube", "sphere"]);

    // Point one entry at a missing description file.
    fs::remove_file(dir.path().join("sphere.txt")).unwrap();

    let manager =
        RetrievalManager::new(config(dir.path()), CapabilityStatus::Ready, keyword_factory())
            .unwrap();

    let hits = manager.query("cube sphere cone", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.get("id").unwrap(), &json!("cube"));
}

#[test]
fn missing_manifest_fails_cold_start_but_query_reports_it() {
    let dir = TempDir::new().unwrap();
    // No dataset.json at all.

    let manager =
        RetrievalManager::new(config(dir.path()), CapabilityStatus::Ready, keyword_factory())
            .unwrap();
    let err = manager.query("cube", 1).unwrap_err();
    assert!(matches!(err, RetrievalError::Ingest(_)));
    assert!(manager.last_error().is_some());
}
