//! Qdrant-backed candidate index
//!
//! Stores reference passages with their embeddings in a single cosine
//! collection and serves ranked similarity search. The index is an
//! external collaborator: score semantics and ANN behavior are qdrant's
//! contract, not the engine's.

use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        value::Kind, vectors_config::Config, with_payload_selector::SelectorOptions,
        CreateCollection, Distance, PointStruct, SearchPoints, Value as QdrantValue,
        VectorParams, VectorsConfig, WithPayloadSelector,
    },
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{RagError, Result};
use crate::providers::{Candidate, CandidateIndex};

/// Candidate index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Qdrant gRPC URL
    pub url: String,
    pub collection: String,
    /// Embedding dimension the collection is created with
    pub dimension: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection: "passages".to_string(),
            // bge-m3 output dimension
            dimension: 1024,
        }
    }
}

/// Candidate index backed by a qdrant collection
pub struct QdrantIndex {
    client: QdrantClient,
    config: IndexConfig,
}

impl QdrantIndex {
    /// Connect and create the collection if it does not exist yet
    pub async fn connect(config: IndexConfig) -> Result<Self> {
        let client = QdrantClient::from_url(&config.url)
            .build()
            .map_err(|e| RagError::Retrieval(format!("failed to create qdrant client: {}", e)))?;

        let index = Self { client, config };
        index.init_collection().await?;
        Ok(index)
    }

    async fn init_collection(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| RagError::Retrieval(format!("failed to list collections: {}", e)))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.config.collection);

        if !exists {
            self.client
                .create_collection(&CreateCollection {
                    collection_name: self.config.collection.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: self.config.dimension,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    RagError::Retrieval(format!(
                        "failed to create collection {}: {}",
                        self.config.collection, e
                    ))
                })?;
        }

        Ok(())
    }
}

#[async_trait]
impl CandidateIndex for QdrantIndex {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>> {
        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.config.collection.clone(),
                vector: vector.to_vec(),
                limit: k as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| RagError::Retrieval(format!("search failed: {}", e)))?;

        let candidates = response
            .result
            .into_iter()
            .map(|point| Candidate {
                content: point
                    .payload
                    .get("content")
                    .and_then(value_as_string)
                    .unwrap_or_default(),
                score: point.score,
            })
            .collect();

        Ok(candidates)
    }

    async fn upsert(&self, id: &str, content: &str, vector: &[f32]) -> Result<()> {
        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        payload.insert("content".to_string(), QdrantValue::from(content.to_string()));

        let point = PointStruct::new(id.to_string(), vector.to_vec(), payload);

        self.client
            .upsert_points_blocking(&self.config.collection, None, vec![point], None)
            .await
            .map_err(|e| RagError::Retrieval(format!("upsert failed: {}", e)))?;

        Ok(())
    }
}

fn value_as_string(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}
