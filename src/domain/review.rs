use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured verifier report, keyed by the execution work item it covers.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PrReview {
    pub work_item_id: Uuid,
    pub spec_alignment: serde_json::Value,
    pub code_quality: serde_json::Value,
    pub overall_summary: Option<String>,
}
