/*!
 * Wire types for the memory-storage API
 */

use serde::{Deserialize, Serialize};

/// One stored memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Request body for storing a memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemoryRequest {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Request body for semantic search over stored memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Search response: matches ordered by relevance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<MemoryRecord>,
}

/// Listing response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub memories: Vec<MemoryRecord>,
}

/// Service health endpoint payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_request_omits_empty_optionals() {
        let request = AddMemoryRequest {
            content: "remember the milk".to_string(),
            user_id: None,
            metadata: None,
        };
        let json = serde_json::to_string(&request).expect("serialize failed");
        assert_eq!(json, r#"{"content":"remember the milk"}"#);
    }

    #[test]
    fn record_roundtrips_metadata() {
        let json = r#"{
            "id": "mem-1",
            "content": "prefers dark roast",
            "user_id": "u-7",
            "metadata": {"source": "chat"}
        }"#;
        let record: MemoryRecord = serde_json::from_str(json).expect("parse failed");
        assert_eq!(record.id, "mem-1");
        assert_eq!(
            record.metadata.as_ref().and_then(|m| m["source"].as_str()),
            Some("chat")
        );
        assert!(record.created_at.is_none());
    }
}
