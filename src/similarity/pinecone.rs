use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{UserId, config::RemoteIndex};

use super::{Neighbor, SearchError, SimilaritySearch, VectorRecord};

/// JSON client for a hosted vector index data plane.
#[derive(Clone)]
pub struct PineconeIndex {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<UserId, VectorRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Neighbor>,
}

impl PineconeIndex {
    pub fn new(remote: &RemoteIndex) -> Result<Self, SearchError> {
        let http_client = reqwest::ClientBuilder::new()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http_client,
            base_url: remote.url.clone(),
            api_key: remote.api_key.clone(),
        })
    }

    async fn check(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, SearchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SearchError::Status { endpoint, status, body })
    }
}

#[async_trait]
impl SimilaritySearch for PineconeIndex {
    async fn fetch_by_ids(&self, ids: &[UserId]) -> Result<HashMap<UserId, VectorRecord>, SearchError> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        let response = self
            .http_client
            .get(format!("{}/vectors/fetch", self.base_url))
            .header("Api-Key", &self.api_key)
            .query(&query)
            .send()
            .await?;
        let FetchResponse { vectors } = Self::check("fetch", response).await?.json::<FetchResponse>().await?;

        debug!(requested = ids.len(), found = vectors.len(), "fetched vectors");
        Ok(vectors)
    }

    async fn query_nearest(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Neighbor>, SearchError> {
        let response = self
            .http_client
            .post(format!("{}/query", self.base_url))
            .header("Api-Key", &self.api_key)
            .json(&QueryRequest {
                vector,
                top_k,
                include_metadata,
                include_values: false,
            })
            .send()
            .await?;
        let QueryResponse { matches } = Self::check("query", response).await?.json::<QueryResponse>().await?;

        debug!(top_k, hits = matches.len(), "queried nearest vectors");
        Ok(matches)
    }
}
