//! In-memory backend: add a few nouns, relate them, run a vector search.
//!
//! ```text
//! cargo run --example quickstart
//! ```

use brainy::{AddRequest, Brainy, BrainyConfig, FindRequest, RelateRequest};
use brainy::types::{NounType, VerbType};

fn fake_embedding(seed: u8) -> Vec<f32> {
    (0..768).map(|i| ((seed as f32) * 0.01 + i as f32 * 0.0001).sin()).collect()
}

#[tokio::main]
async fn main() -> brainy::Result<()> {
    let db = Brainy::init(BrainyConfig::default()).await?;

    let acme = db
        .add(AddRequest {
            id: None,
            data: None,
            vector: Some(fake_embedding(1)),
            noun_type: NounType::Organization,
            metadata: None,
            label: Some("Acme Corp".to_string()),
        })
        .await?;

    let jane = db
        .add(AddRequest {
            id: None,
            data: None,
            vector: Some(fake_embedding(2)),
            noun_type: NounType::Person,
            metadata: None,
            label: Some("Jane".to_string()),
        })
        .await?;

    db.relate(RelateRequest { from: jane, to: acme, verb_type: VerbType::EmployedBy, weight: None, metadata: None })
        .await?;

    let result = db
        .find(FindRequest {
            query: None,
            vector: Some(fake_embedding(1)),
            k: 5,
            filter: None,
            include_metadata: true,
            include_vectors: false,
            skip_cache: false,
        })
        .await?;

    for hit in &result.hits {
        let label = hit.noun.as_ref().and_then(|n| n.label.as_deref()).unwrap_or("<unlabeled>");
        println!("{label}: score={:.4}", hit.score);
    }

    let relations = db.get_relations(Some(jane), None, None, true).await?;
    println!("jane has {} outgoing relations", relations.len());

    db.shutdown().await?;
    Ok(())
}
