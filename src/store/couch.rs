use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use crate::logic::paths::{path_pairs, terminal_segment};
use crate::model::{Container, QueryParams, Spec, UpdateMode, SPEC_DATABASE, SPEC_DOCUMENT};
use crate::store::navigate::{self, nav_steps};
use crate::store::traits::{
    parse_body, required_collection, sanitize_doc, DocumentStore, StoreError,
};
use crate::store::views::{
    assemble_container, design_document, filter_result_set, paginate, pick_view,
    set_limit_and_offset, ViewOpts, ViewRow, DESIGN_DOC_ID,
};

const CONNECT_ATTEMPTS: u32 = 5;

/// A document store backed by a CouchDB-compatible server.
pub struct CouchStore {
    base_url: String,
    http: reqwest::Client,
    // single-slot token guarding connection recovery
    connection: Mutex<()>,
}

#[derive(Debug, Deserialize)]
struct CouchViewResponse {
    #[serde(default)]
    total_rows: i64,
    #[serde(default)]
    rows: Vec<CouchRow>,
}

#[derive(Debug, Deserialize)]
struct CouchRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    key: Value,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    doc: Option<Value>,
}

impl From<CouchRow> for ViewRow {
    fn from(row: CouchRow) -> Self {
        let value = match row.doc {
            Some(doc) => doc,
            None => row.value,
        };
        ViewRow {
            id: row.id,
            key: row.key,
            value,
        }
    }
}

impl CouchStore {
    pub fn new(url: &str) -> Self {
        CouchStore {
            base_url: url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            connection: Mutex::new(()),
        }
    }

    /// Pings the server, recovering with a bounded backoff loop when it is
    /// unreachable. The mutex keeps recovery attempts single-flight.
    async fn ensure_connection(&self) -> Result<()> {
        let _slot = self.connection.lock().await;

        if self.ping().await {
            return Ok(());
        }

        log::warn!("document store at {} not responding, retrying", self.base_url);
        let mut delay = Duration::from_millis(500);
        for _ in 0..CONNECT_ATTEMPTS {
            sleep(delay).await;
            if self.ping().await {
                return Ok(());
            }
            delay *= 2;
        }
        Err(anyhow!(
            "document store at {} is unreachable",
            self.base_url
        ))
    }

    async fn ping(&self) -> bool {
        match self.http.get(format!("{}/_up", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn ensure_db(&self, database: &str) -> Result<()> {
        let resp = self
            .http
            .put(format!("{}/{}", self.base_url, database))
            .send()
            .await
            .context("failed to reach document store")?;
        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::PRECONDITION_FAILED => Ok(()),
            status => Err(anyhow!("failed to create database {}: {}", database, status)),
        }
    }

    fn doc_url(&self, database: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, database, id)
    }

    async fn get_doc(&self, database: &str, id: &str) -> Result<Option<Value>> {
        let resp = self
            .http
            .get(self.doc_url(database, id))
            .send()
            .await
            .context("failed to reach document store")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(anyhow!("failed to load {}/{}: {}", database, id, resp.status()));
        }
        Ok(Some(resp.json().await?))
    }

    async fn rev(&self, database: &str, id: &str) -> Result<Option<String>> {
        let doc = self.get_doc(database, id).await?;
        Ok(doc
            .as_ref()
            .and_then(|d| d.get("_rev"))
            .and_then(|r| r.as_str())
            .map(|r| r.to_string()))
    }

    /// Saves a document, carrying the current revision. A revision race
    /// surfaces as a conflict.
    async fn save(&self, database: &str, id: &str, document: &Value) -> Result<Value> {
        self.ensure_connection().await?;
        self.ensure_db(database).await?;

        let mut document = document.clone();
        if let Value::Object(map) = &mut document {
            match self.rev(database, id).await? {
                Some(rev) => {
                    map.insert("_rev".to_string(), Value::String(rev));
                }
                None => {
                    map.remove("_rev");
                }
            }
        }

        let resp = self
            .http
            .put(self.doc_url(database, id))
            .json(&document)
            .send()
            .await
            .context("failed to reach document store")?;
        match resp.status() {
            status if status.is_success() => Ok(document),
            StatusCode::CONFLICT => Err(anyhow!(StoreError::Conflict(id.to_string()))),
            status => Err(anyhow!("failed to save {}/{}: {}", database, id, status)),
        }
    }

    async fn delete(&self, database: &str, id: &str, rev: &str) -> Result<()> {
        let resp = self
            .http
            .delete(format!("{}?rev={}", self.doc_url(database, id), rev))
            .send()
            .await
            .context("failed to reach document store")?;
        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(anyhow!(StoreError::NotFound)),
            StatusCode::CONFLICT => Err(anyhow!(StoreError::Conflict(id.to_string()))),
            status => Err(anyhow!("failed to delete {}/{}: {}", database, id, status)),
        }
    }

    fn view_query(opts: &ViewOpts) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(key) = &opts.key {
            query.push(("key", key.to_string()));
        }
        if let Some(startkey) = &opts.startkey {
            query.push(("startkey", startkey.to_string()));
        }
        if let Some(endkey) = &opts.endkey {
            query.push(("endkey", endkey.to_string()));
        }
        if let Some(limit) = opts.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(skip) = opts.skip {
            query.push(("skip", skip.to_string()));
        }
        if opts.descending {
            query.push(("descending", "true".to_string()));
        }
        if opts.include_docs {
            query.push(("include_docs", "true".to_string()));
        }
        query
    }

    async fn query_view(
        &self,
        database: &str,
        view: &str,
        opts: &ViewOpts,
    ) -> Result<CouchViewResponse> {
        let url = format!(
            "{}/{}/{}/_view/{}",
            self.base_url, database, DESIGN_DOC_ID, view
        );
        let resp = self
            .http
            .get(url)
            .query(&Self::view_query(opts))
            .send()
            .await
            .context("failed to reach document store")?;
        if !resp.status().is_success() {
            return Err(anyhow!(
                "view {} on {} failed: {}",
                view,
                database,
                resp.status()
            ));
        }
        Ok(resp.json().await?)
    }

    async fn all_docs(&self, database: &str, opts: &ViewOpts) -> Result<CouchViewResponse> {
        let mut opts = opts.clone();
        opts.include_docs = true;
        let resp = self
            .http
            .get(format!("{}/{}/_all_docs", self.base_url, database))
            .query(&Self::view_query(&opts))
            .send()
            .await
            .context("failed to reach document store")?;
        if !resp.status().is_success() {
            return Err(anyhow!("_all_docs on {} failed: {}", database, resp.status()));
        }
        Ok(resp.json().await?)
    }

    // The view names installed in the collection's design document.
    async fn installed_views(&self, database: &str) -> Result<Vec<String>> {
        let design = self.get_doc(database, DESIGN_DOC_ID).await?;
        Ok(design
            .as_ref()
            .and_then(|d| d.get("views"))
            .and_then(|v| v.as_object())
            .map(|views| views.keys().cloned().collect())
            .unwrap_or_default())
    }

    // Runs the planner and the selected view for one query.
    async fn run_query(
        &self,
        params: &mut QueryParams,
        limit: i64,
        offset: i64,
    ) -> Result<(i64, Vec<ViewRow>)> {
        let collection = required_collection(&params.path)?;
        self.ensure_connection().await?;

        let installed = self.installed_views(&collection).await?;
        let (view_name, opts) = pick_view(
            params,
            |name| installed.iter().any(|v| v == name),
            limit,
            offset,
        );

        let response = if installed.iter().any(|v| v == &view_name) {
            self.query_view(&collection, &view_name, &opts).await?
        } else {
            self.all_docs(&collection, &opts).await?
        };

        let mut total = response.total_rows;
        let mut rows: Vec<ViewRow> = response.rows.into_iter().map(ViewRow::from).collect();

        if !params.query_params.is_empty() {
            rows = filter_result_set(rows, params);
            total = rows.len() as i64;
            rows = paginate(rows, limit, offset);
        }
        Ok((total, rows))
    }

    // Loads the enclosing root document addressed by the first path pair.
    async fn root_document(&self, params: &QueryParams) -> Result<(String, Value)> {
        let pairs = path_pairs(&params.path);
        let first = pairs.first().ok_or_else(|| anyhow!(StoreError::NotFound))?;

        let mut root_params = QueryParams::for_path(format!("/{}/{{{}}}", first.segment, first.param));
        if let Some(value) = params.path_params.get(&first.param) {
            root_params
                .path_params
                .insert(first.param.clone(), value.clone());
        }

        let (_, rows) = self.run_query(&mut root_params, 10, 0).await?;
        let row = rows.into_iter().next().ok_or_else(|| anyhow!(StoreError::NotFound))?;
        Ok((row.id, row.value))
    }
}

#[async_trait::async_trait]
impl DocumentStore for CouchStore {
    async fn query(&self, params: &QueryParams) -> Result<Container> {
        let mut params = params.clone();
        let (limit, offset) = set_limit_and_offset(&mut params);
        if limit < 1 {
            return Err(anyhow!(StoreError::BadLimit));
        }

        let (total, rows) = self.run_query(&mut params, limit, offset).await?;
        Ok(assemble_container(&params.path, rows, total, limit, offset))
    }

    async fn insert(&self, params: &QueryParams) -> Result<Value> {
        let collection = required_collection(&params.path)?;
        let body = parse_body(&params.body)?;

        let mut stored = if params.path_params.is_empty() {
            if !body.is_object() {
                return Err(anyhow!(StoreError::BadShape(
                    "body must be a JSON object".to_string()
                )));
            }
            self.save(&collection, &Uuid::new_v4().to_string(), &body)
                .await?
        } else {
            let (id, root) = self.root_document(params).await?;
            let terminal =
                terminal_segment(&params.path).ok_or_else(|| anyhow!(StoreError::NotFound))?;
            let steps = nav_steps(params);
            let (new_root, partial) = navigate::append(root, &steps, &terminal, &body)?;
            self.save(&collection, &id, &new_root).await?;
            partial
        };

        sanitize_doc(&mut stored);
        Ok(stored)
    }

    async fn update(&self, params: &QueryParams, mode: UpdateMode) -> Result<Value> {
        let collection = required_collection(&params.path)?;
        let body = parse_body(&params.body)?;

        let (id, root) = self.root_document(params).await?;
        let steps = nav_steps(params);
        let (new_root, mut partial) = navigate::update(root, &steps, &body, mode)?;
        self.save(&collection, &id, &new_root).await?;

        sanitize_doc(&mut partial);
        Ok(partial)
    }

    async fn remove(&self, params: &QueryParams) -> Result<()> {
        let collection = required_collection(&params.path)?;

        if params.path_params.len() == 1 {
            let (id, _) = self.root_document(params).await?;
            let rev = self
                .rev(&collection, &id)
                .await?
                .ok_or_else(|| anyhow!(StoreError::NotFound))?;
            return self.delete(&collection, &id, &rev).await;
        }

        let (id, root) = self.root_document(params).await?;
        let steps = nav_steps(params);
        let new_root = navigate::remove(root, &steps)?;
        self.save(&collection, &id, &new_root).await?;
        Ok(())
    }

    async fn prep(&self, collection: &str, spec: &Spec) -> Result<()> {
        self.ensure_connection().await?;
        self.ensure_db(collection).await?;

        let mut design = design_document(collection, spec);
        design.rev = self.rev(collection, DESIGN_DOC_ID).await?;
        let body = serde_json::to_value(&design)?;

        let resp = self
            .http
            .put(self.doc_url(collection, DESIGN_DOC_ID))
            .json(&body)
            .send()
            .await
            .context("failed to reach document store")?;
        if !resp.status().is_success() {
            return Err(anyhow!(
                "failed to install design document for {}: {}",
                collection,
                resp.status()
            ));
        }
        Ok(())
    }

    async fn load_definition(&self, template: &Spec) -> Result<Spec> {
        self.ensure_connection().await?;
        self.ensure_db(SPEC_DATABASE).await?;

        match self.get_doc(SPEC_DATABASE, SPEC_DOCUMENT).await? {
            Some(doc) => Ok(serde_json::from_value(doc)?),
            None => Ok(template.clone()),
        }
    }

    async fn save_definition(&self, spec: &Spec) -> Result<()> {
        let doc = serde_json::to_value(spec)?;
        self.save(SPEC_DATABASE, SPEC_DOCUMENT, &doc).await?;
        Ok(())
    }
}
