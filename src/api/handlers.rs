use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, StatusCode};
use axum::response::Response;
use serde_json::Value;

use crate::logic::coerce::{coerce_map, CoerceError};
use crate::logic::paths::is_single_path;
use crate::model::{Container, Operation, QueryParams, UpdateMode};
use crate::store::traits::{DocumentStore, StoreError};

/// Everything one registered route needs at request time: the template the
/// store's planner keys on, the method, the operation contract, and the
/// merged media types.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub template: String,
    pub method: &'static str,
    pub operation: Operation,
    pub produces: String,
    pub consumes: String,
}

/// Binds one request to its operation: coerce parameters, compose the
/// query, dispatch to the store, and map the outcome to an envelope and
/// status code.
pub async fn dispatch<S: DocumentStore + 'static>(
    ctx: Arc<RouteContext>,
    store: Arc<S>,
    path_params: HashMap<String, String>,
    query: BTreeMap<String, String>,
    body: Bytes,
) -> Response {
    if ctx.method == "OPTIONS" {
        return options_response(&ctx);
    }

    let op = &ctx.operation;
    let path_params = match coerce_map(op, path_params.iter().map(|(k, v)| (k.as_str(), v.as_str()))) {
        Ok(coerced) => coerced,
        Err(err) => return validation_response(&ctx, err),
    };
    let query_params = match coerce_map(op, query.iter().map(|(k, v)| (k.as_str(), v.as_str()))) {
        Ok(coerced) => coerced,
        Err(err) => return validation_response(&ctx, err),
    };

    let mut params = QueryParams {
        path: ctx.template.clone(),
        path_params,
        query_params,
        body: Vec::new(),
    };
    if matches!(ctx.method, "POST" | "PUT" | "PATCH") {
        params.body = body.to_vec();
    }

    // The store interaction runs on its own task: a client disconnect
    // cancels this handler's future, not the in-flight operation.
    let method = ctx.method;
    let task = tokio::spawn(async move {
        match method {
            "GET" => store.query(&params).await.map(Outcome::Queried),
            "POST" => store.insert(&params).await.map(Outcome::Written),
            "PUT" => store
                .update(&params, UpdateMode::Replace)
                .await
                .map(Outcome::Written),
            "PATCH" => store
                .update(&params, UpdateMode::Merge)
                .await
                .map(Outcome::Written),
            "DELETE" => store.remove(&params).await.map(|_| Outcome::Removed),
            _ => Ok(Outcome::Unsupported),
        }
    });

    let result = match task.await {
        Ok(result) => result,
        Err(join_err) => {
            return text_response(
                &ctx,
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::to_string(&join_err.to_string()).unwrap_or_default(),
            )
        }
    };

    match result {
        Ok(Outcome::Queried(container)) => query_response(&ctx, container),
        Ok(Outcome::Written(doc)) => {
            let status = if ctx.method == "POST" {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            json_response(&ctx, status, &doc)
        }
        Ok(Outcome::Removed) => text_response(&ctx, StatusCode::OK, String::new()),
        Ok(Outcome::Unsupported) => {
            text_response(&ctx, StatusCode::METHOD_NOT_ALLOWED, String::new())
        }
        Err(err) => store_error_response(&ctx, err),
    }
}

enum Outcome {
    Queried(Container),
    Written(Value),
    Removed,
    Unsupported,
}

// A single GET addresses exactly one entity; anything else on such a path
// is a miss. Collection GETs pass empty result sets through.
fn query_response(ctx: &RouteContext, container: Container) -> Response {
    if is_single_path(&ctx.template) && container.meta.count != 1 {
        return not_found_response(ctx);
    }
    json_response(ctx, StatusCode::OK, &container)
}

fn options_response(ctx: &RouteContext) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, ctx.produces.as_str());

    if let Some(ok) = ctx.operation.responses.get("200") {
        for (name, header_spec) in &ok.headers {
            if let Some(default) = &header_spec.default {
                let value = match default {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                builder = builder.header(name.as_str(), value);
            }
        }
    }
    builder.body(String::new().into()).unwrap()
}

fn json_response<T: serde::Serialize>(ctx: &RouteContext, status: StatusCode, payload: &T) -> Response {
    let body = serde_json::to_string(payload)
        .unwrap_or_else(|e| serde_json::to_string(&e.to_string()).unwrap_or_default());
    text_response(ctx, status, body)
}

fn text_response(ctx: &RouteContext, status: StatusCode, body: String) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, ctx.produces.as_str())
        .header(header::ACCEPT, ctx.consumes.as_str())
        .body(body.into())
        .unwrap()
}

fn validation_response(ctx: &RouteContext, err: CoerceError) -> Response {
    let body = serde_json::to_string(&err.to_string()).unwrap_or_default();
    text_response(ctx, StatusCode::CONFLICT, body)
}

fn not_found_response(ctx: &RouteContext) -> Response {
    let body = serde_json::to_string(StoreError::NotFound.to_string().as_str()).unwrap_or_default();
    text_response(ctx, StatusCode::NOT_FOUND, body)
}

// The engine is the sole translator from store error to HTTP status.
fn store_error_response(ctx: &RouteContext, err: anyhow::Error) -> Response {
    let status = match err.downcast_ref::<StoreError>() {
        Some(StoreError::NotFound) => StatusCode::NOT_FOUND,
        Some(StoreError::Conflict(_)) => StatusCode::CONFLICT,
        Some(StoreError::BadPayload(_)) => StatusCode::BAD_REQUEST,
        Some(StoreError::BadLimit) => StatusCode::CONFLICT,
        Some(StoreError::BadShape(_)) | None => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = serde_json::to_string(&err.to_string()).unwrap_or_default();
    text_response(ctx, status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn ctx() -> RouteContext {
        RouteContext {
            template: "/posts/{id}".to_string(),
            method: "GET",
            operation: Operation::default(),
            produces: "application/json;charset=utf-8".to_string(),
            consumes: "application/json;charset=utf-8".to_string(),
        }
    }

    #[test]
    fn not_found_body_is_the_json_quoted_sentinel() {
        let response = store_error_response(&ctx(), anyhow!(StoreError::NotFound));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflicts_and_bad_limits_map_to_409() {
        let response = store_error_response(&ctx(), anyhow!(StoreError::Conflict("d".into())));
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = store_error_response(&ctx(), anyhow!(StoreError::BadLimit));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn unclassified_errors_are_server_errors() {
        let response = store_error_response(&ctx(), anyhow!("view query failed"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = store_error_response(&ctx(), anyhow!(StoreError::BadShape("x".into())));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn single_get_with_no_hit_is_a_miss() {
        let empty = Container::ok("PostContainer".to_string(), Vec::new());
        let response = query_response(&ctx(), empty);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn collection_get_passes_empty_results_through() {
        let mut collection_ctx = ctx();
        collection_ctx.template = "/posts".to_string();
        let empty = Container::ok("PostContainer".to_string(), Vec::new());
        let response = query_response(&collection_ctx, empty);
        assert_eq!(response.status(), StatusCode::OK);
    }
}
