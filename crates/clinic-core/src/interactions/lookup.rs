//! Interaction knowledge-base lookups.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use clinic_net::{ClientResult, RequestEnvelope, ResilientHttpClient};

use crate::models::InteractionWarning;

/// Source of pairwise interaction warnings for a composition set.
#[async_trait]
pub trait InteractionLookup: Send + Sync {
    /// Warnings for every interacting pair among `composition_ids`.
    async fn lookup(&self, composition_ids: &[String]) -> ClientResult<Vec<InteractionWarning>>;
}

#[derive(Deserialize)]
struct CheckResponse {
    #[serde(default)]
    warnings: Vec<InteractionWarning>,
}

/// `POST /compositions/check-ddi` through the resilient client.
pub struct HttpInteractionLookup {
    client: Arc<ResilientHttpClient>,
}

impl HttpInteractionLookup {
    pub fn new(client: Arc<ResilientHttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InteractionLookup for HttpInteractionLookup {
    async fn lookup(&self, composition_ids: &[String]) -> ClientResult<Vec<InteractionWarning>> {
        let envelope = RequestEnvelope::post("/compositions/check-ddi")
            .with_body(serde_json::json!({ "compositionIds": composition_ids }));
        let response: CheckResponse = self.client.send_json(&envelope).await?;
        Ok(response.warnings)
    }
}
