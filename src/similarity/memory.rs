use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::UserId;

use super::{Metadata, Neighbor, SearchError, SimilaritySearch, VectorRecord};

/// In-process index using brute-force cosine similarity.
///
/// Stands in for the remote index in tests.
#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<UserId, VectorRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user's vector.
    pub fn upsert(&self, id: &str, values: Vec<f32>, metadata: Option<Metadata>) {
        self.records.write().insert(
            id.to_owned(),
            VectorRecord {
                id: id.to_owned(),
                values,
                metadata,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine similarity in `[-1, 1]`; zero-length or mismatched vectors score -1.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return -1.0;
    }

    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;
    for (&ai, &bi) in a.iter().zip(b) {
        let (ai, bi) = (ai as f64, bi as f64);
        dot += ai * bi;
        norm_a += ai * ai;
        norm_b += bi * bi;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return -1.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

#[async_trait]
impl SimilaritySearch for MemoryIndex {
    async fn fetch_by_ids(&self, ids: &[UserId]) -> Result<HashMap<UserId, VectorRecord>, SearchError> {
        let records = self.records.read();
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }

    async fn query_nearest(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Neighbor>, SearchError> {
        let records = self.records.read();
        let mut hits: Vec<Neighbor> = records
            .values()
            .map(|r| Neighbor {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: if include_metadata { r.metadata.clone() } else { None },
            })
            .collect();

        // ties broken by id so results do not depend on map order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);
        Ok(hits)
    }
}
