use anyhow::Result;
use serde_json::Value;
use thiserror::Error;

use crate::model::{Container, QueryParams, Spec, UpdateMode};

/// Errors the request engine translates into HTTP statuses. Anything else
/// coming out of a store is a 500.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("Entity not found.")]
    NotFound,
    #[error("document update conflict on {0}")]
    Conflict(String),
    #[error("{0}")]
    BadShape(String),
    #[error("malformed JSON body: {0}")]
    BadPayload(String),
    #[error("Limit must be greater than 0")]
    BadLimit,
}

/// The operations the request engine requires of a document store.
///
/// Implementations own a notion of named views (secondary indexes derived
/// from the specification's paths); `prep` installs them and must be
/// idempotent for a given spec, modulo the store's revision tagging.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Query documents for a GET, honoring path addressing, filters and
    /// pagination, and assemble the response envelope.
    async fn query(&self, params: &QueryParams) -> Result<Container>;

    /// Insert a new primary document, or append a sub-document when the
    /// path addresses a nested array. Returns the stored document with
    /// store-internal fields removed.
    async fn insert(&self, params: &QueryParams) -> Result<Value>;

    /// Replace or merge the addressed document or sub-document. Returns the
    /// mutated node.
    async fn update(&self, params: &QueryParams, mode: UpdateMode) -> Result<Value>;

    /// Delete the addressed document, or splice the addressed element out
    /// of a nested array.
    async fn remove(&self, params: &QueryParams) -> Result<()>;

    /// Ensure the collection exists and its design document carries the
    /// views derived from the spec's paths.
    async fn prep(&self, collection: &str, spec: &Spec) -> Result<()>;

    /// Load the persisted specification, falling back to the template.
    async fn load_definition(&self, template: &Spec) -> Result<Spec>;

    /// Persist the specification under its well-known key.
    async fn save_definition(&self, spec: &Spec) -> Result<()>;
}

/// Strips store-internal keys from a document before it reaches a response.
pub fn sanitize_doc(doc: &mut Value) {
    if let Value::Object(map) = doc {
        map.remove("_id");
        map.remove("_rev");
    }
}

/// Parses a request body, surfacing malformed JSON as a payload error.
pub fn parse_body(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body)
        .map_err(|e| anyhow::anyhow!(StoreError::BadPayload(e.to_string())))
}

/// The collection a query addresses: the template's first segment.
pub fn required_collection(path: &str) -> Result<String> {
    crate::logic::paths::collection_name(path)
        .ok_or_else(|| anyhow::anyhow!(StoreError::NotFound))
}
