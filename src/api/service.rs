use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::{header, HeaderName, Method};
use axum::response::Json;
use axum::routing::{get, MethodFilter, MethodRouter};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::api::handlers::{dispatch, RouteContext};
use crate::config::AppConfig;
use crate::logic::generate::regenerate;
use crate::logic::induce::induce;
use crate::logic::paths::{collection_name, translate_path};
use crate::model::{Operation, Spec};
use crate::store::traits::DocumentStore;

/// One running API service: the immutable spec, the store handle and the
/// router built from them. Construction wires everything; nothing lives in
/// process-wide state, so multiple services can coexist in one process.
pub struct Service<S: DocumentStore> {
    spec: Arc<Spec>,
    store: Arc<S>,
    router: Router,
}

impl<S: DocumentStore + 'static> Service<S> {
    /// Bootstraps a service from the persisted spec: routes are rebuilt
    /// deterministically, handlers registered, and each collection's
    /// secondary indexes ensured.
    pub async fn bootstrap(store: Arc<S>, cnf: &AppConfig) -> Result<Self> {
        let mut spec = store.load_definition(&cnf.spec_template()).await?;
        regenerate(&mut spec, cnf);

        for collection in spec_collections(&spec) {
            store.prep(&collection, &spec).await?;
        }

        let spec = Arc::new(spec);
        let router = build_router(spec.clone(), store.clone());
        Ok(Service { spec, store, router })
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    /// The router serving this spec; clone freely, handlers are stateless.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Induces a schema from sample data, merges it into the persisted spec,
/// regenerates routes, saves the spec and preps the affected collections.
/// Runs before a `Service` is constructed; the spec is immutable afterward.
pub async fn learn<S: DocumentStore>(
    store: &S,
    cnf: &AppConfig,
    sample: &[u8],
    base_type: &str,
) -> Result<Spec> {
    let mut spec = store.load_definition(&cnf.spec_template()).await?;

    let induced = induce(sample, base_type, &cnf.container_models())?;
    for (name, schema) in induced {
        spec.definitions.entry(name).or_insert(schema);
    }

    regenerate(&mut spec, cnf);
    store.save_definition(&spec).await?;

    for collection in spec_collections(&spec) {
        store.prep(&collection, &spec).await?;
    }
    Ok(spec)
}

fn spec_collections(spec: &Spec) -> BTreeSet<String> {
    spec.paths.keys().filter_map(|p| collection_name(p)).collect()
}

fn build_router<S: DocumentStore + 'static>(spec: Arc<Spec>, store: Arc<S>) -> Router {
    let mut router = Router::new();

    let docs = spec.clone();
    router = router.route(
        "/api-docs",
        get(move || {
            let docs = docs.clone();
            async move { Json((*docs).clone()) }
        }),
    );

    for (template, item) in &spec.paths {
        let concrete = format!("{}{}", spec.base_path, translate_path(template));

        let mut method_router: MethodRouter = MethodRouter::new();
        for (method, op) in item.operations() {
            let ctx = Arc::new(route_context(&spec, template, method, op));
            let store = store.clone();

            let handler = move |path_params: Option<Path<HashMap<String, String>>>,
                                Query(query): Query<BTreeMap<String, String>>,
                                body: Bytes| {
                let ctx = ctx.clone();
                let store = store.clone();
                async move {
                    let path_params = path_params.map(|Path(p)| p).unwrap_or_default();
                    dispatch(ctx, store, path_params, query, body).await
                }
            };
            method_router = method_router.on(method_filter(method), handler);
        }
        router = router.route(&concrete, method_router);
    }

    router.layer(cors_layer())
}

fn route_context(spec: &Spec, template: &str, method: &'static str, op: &Operation) -> RouteContext {
    let produces = op
        .produces
        .first()
        .or_else(|| spec.produces.first())
        .cloned()
        .unwrap_or_else(|| "application/json;charset=utf-8".to_string());
    let consumes = op
        .consumes
        .first()
        .or_else(|| spec.consumes.first())
        .cloned()
        .unwrap_or_else(|| "application/json;charset=utf-8".to_string());

    RouteContext {
        template: template.to_string(),
        method,
        operation: op.clone(),
        produces,
        consumes,
    }
}

fn method_filter(method: &str) -> MethodFilter {
    match method {
        "GET" => MethodFilter::GET,
        "PUT" => MethodFilter::PUT,
        "POST" => MethodFilter::POST,
        "DELETE" => MethodFilter::DELETE,
        "OPTIONS" => MethodFilter::OPTIONS,
        "HEAD" => MethodFilter::HEAD,
        _ => MethodFilter::PATCH,
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::GET,
            Method::OPTIONS,
            Method::DELETE,
        ])
        .allow_headers([
            header::ORIGIN,
            header::EXPIRES,
            header::CACHE_CONTROL,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
        ])
}
