//! `local_fs` backend: data written in one process is visible after a fresh
//! `Brainy::init` against the same directory — both a direct `get` and a
//! vector `find`, since `init` replays persisted vectors into the search
//! index before returning.
//!
//! ```text
//! cargo run --example local_fs -- /tmp/brainy-demo
//! ```

use brainy::config::{BrainyConfig, StorageConfig, StorageKind};
use brainy::types::NounType;
use brainy::{AddRequest, Brainy, FindRequest};

fn config_for(root: &str) -> BrainyConfig {
    let mut config = BrainyConfig::default();
    config.storage = StorageConfig { kind: Some(StorageKind::LocalFs), bucket: Some(root.to_string()), ..config.storage };
    config
}

fn vector() -> Vec<f32> {
    vec![0.1; 768]
}

#[tokio::main]
async fn main() -> brainy::Result<()> {
    let root = std::env::args().nth(1).unwrap_or_else(|| "/tmp/brainy-demo".to_string());

    let id = {
        let db = Brainy::init(config_for(&root)).await?;
        let id = db
            .add(AddRequest { id: None, data: None, vector: Some(vector()), noun_type: NounType::Document, metadata: None, label: Some("first run".to_string()) })
            .await?;
        db.shutdown().await?;
        id
    };

    // A fresh handle over the same directory sees what the first one wrote,
    // including the search index: `find` doesn't need the process that
    // inserted the noun to still be running.
    let db = Brainy::init(config_for(&root)).await?;
    let noun = db.get(id).await?.expect("noun persisted across restarts");
    println!("recovered noun {id} with label {:?}", noun.label);

    let result = db.find(FindRequest { query: None, vector: Some(vector()), k: 1, filter: None, include_metadata: false, include_vectors: false, skip_cache: true }).await?;
    assert_eq!(result.hits.first().map(|h| h.id), Some(id), "vector search should survive the restart too");
    println!("find also recovered it after rehydrating the index");

    db.shutdown().await?;
    Ok(())
}
