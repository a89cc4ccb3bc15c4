use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata about a result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMeta {
    #[serde(rename = "responseCode", default)]
    pub response_code: u16,
    #[serde(rename = "responseMessage", default)]
    pub response_message: String,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub count: i64,
}

/// The response envelope: an ordered result list plus metadata. Single-item
/// reads use the same wrapper with at most one result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub meta: ContainerMeta,
    #[serde(rename = "containerType", default)]
    pub container_type: String,
    #[serde(default)]
    pub results: Vec<Value>,
}

impl Container {
    /// An envelope with the standard 200 metadata for the given results.
    pub fn ok(container_type: String, results: Vec<Value>) -> Self {
        let count = results.len() as i64;
        Container {
            meta: ContainerMeta {
                response_code: 200,
                response_message: "Ok.".to_string(),
                count,
                ..Default::default()
            },
            container_type,
            results,
        }
    }
}
