mod memory;
mod pinecone;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{UserId, geo::GeoPoint};

pub use memory::MemoryIndex;
pub use pinecone::PineconeIndex;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("similarity search: {0}")]
    Http(#[from] reqwest::Error),

    #[error("similarity search: {endpoint} answered {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

/// What the index keeps next to each user's interest vector.
///
/// Coordinates arrive either as numbers or as numeric strings depending on
/// who wrote the record, so they are kept raw and read through
/// [`Metadata::location`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcribed_text: Option<String>,
}

impl Metadata {
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            latitude: Some(Value::from(lat)),
            longitude: Some(Value::from(lon)),
            transcribed_text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.transcribed_text = Some(text.into());
        self
    }

    /// The stored location, or `None` when either coordinate is missing,
    /// unparsable, non-finite or zero.
    pub fn location(&self) -> Option<GeoPoint> {
        let lat = coordinate(self.latitude.as_ref()?)?;
        let lon = coordinate(self.longitude.as_ref()?)?;
        Some(GeoPoint::new(lat, lon))
    }
}

fn coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (parsed.is_finite() && parsed != 0.0).then_some(parsed)
}

/// A stored user: interest vector plus metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: UserId,
    #[serde(default)]
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// One nearest-neighbour hit, most similar first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: UserId,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// The vector index holding users' interest embeddings.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn fetch_by_ids(&self, ids: &[UserId]) -> Result<HashMap<UserId, VectorRecord>, SearchError>;

    /// Up to `top_k` stored vectors closest to `vector`, ordered by descending similarity.
    async fn query_nearest(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Neighbor>, SearchError>;
}
