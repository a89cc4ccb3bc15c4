use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use serde_json::Value;
use uuid::Uuid;

use crate::logic::paths::{path_pairs, terminal_segment};
use crate::model::{Container, QueryParams, Spec, UpdateMode, SPEC_DOCUMENT};
use crate::store::navigate::{self, nav_steps};
use crate::store::traits::{
    parse_body, required_collection, sanitize_doc, DocumentStore, StoreError,
};
use crate::store::views::{
    self, assemble_container, derive_views, execute_view, filter_result_set, paginate, pick_view,
    set_limit_and_offset, ViewRow, ViewSpec,
};

#[derive(Default)]
struct Collection {
    docs: BTreeMap<String, Value>,
    views: BTreeMap<String, ViewSpec>,
}

/// An in-process document store with the same view-planning contract as the
/// real backend. Backs the test suite and embedded usage.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    definitions: RwLock<HashMap<String, Value>>,
    revision: RwLock<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_rev(&self) -> String {
        let mut rev = self.revision.write().unwrap();
        *rev += 1;
        format!("{}-mem", *rev)
    }

    fn save(&self, collection: &str, id: &str, mut doc: Value) -> Value {
        if let Value::Object(map) = &mut doc {
            map.insert("_id".to_string(), Value::String(id.to_string()));
            map.insert("_rev".to_string(), Value::String(self.next_rev()));
        }
        let mut guard = self.collections.write().unwrap();
        let coll = guard.entry(collection.to_string()).or_default();
        coll.docs.insert(id.to_string(), doc.clone());
        doc
    }

    fn run_view(&self, collection: &str, view_name: &str) -> Vec<ViewRow> {
        let guard = self.collections.read().unwrap();
        let Some(coll) = guard.get(collection) else {
            return Vec::new();
        };
        let docs: Vec<(String, Value)> = coll
            .docs
            .iter()
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect();

        match coll.views.get(view_name) {
            Some(view) => execute_view(view, &docs),
            // no such view: fall back to the raw document list
            None => docs
                .into_iter()
                .map(|(id, doc)| ViewRow {
                    key: Value::String(id.clone()),
                    id,
                    value: doc,
                })
                .collect(),
        }
    }

    fn view_exists(&self, collection: &str, view_name: &str) -> bool {
        let guard = self.collections.read().unwrap();
        guard
            .get(collection)
            .map(|coll| coll.views.contains_key(view_name))
            .unwrap_or(false)
    }

    // Loads the enclosing root document addressed by the first path pair.
    fn root_document(&self, params: &QueryParams) -> Result<(String, Value)> {
        let pairs = path_pairs(&params.path);
        let first = pairs.first().ok_or_else(|| anyhow!(StoreError::NotFound))?;
        let collection = required_collection(&params.path)?;

        let root_value = params
            .path_params
            .get(&first.param)
            .ok_or_else(|| anyhow!(StoreError::NotFound))?;

        let view_name = format!("by_path_{}", first.segment);
        let rows = self.run_view(&collection, &view_name);
        let hit = rows
            .into_iter()
            .find(|row| views::collate(&row.key, &root_value.to_value()) == std::cmp::Ordering::Equal)
            .ok_or_else(|| anyhow!(StoreError::NotFound))?;
        Ok((hit.id, hit.value))
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, params: &QueryParams) -> Result<Container> {
        let mut params = params.clone();
        let (limit, offset) = set_limit_and_offset(&mut params);
        if limit < 1 {
            return Err(anyhow!(StoreError::BadLimit));
        }
        let collection = required_collection(&params.path)?;

        let (view_name, opts) =
            pick_view(&mut params, |name| self.view_exists(&collection, name), limit, offset);

        let rows = self.run_view(&collection, &view_name);
        let (view_total, mut rows) = views::apply_opts(rows, &opts);

        let mut total = view_total;
        if !params.query_params.is_empty() {
            rows = filter_result_set(rows, &params);
            total = rows.len() as i64;
            rows = paginate(rows, limit, offset);
        }

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
            self.save(&collection, &Uuid::new_v4().to_string(), body)
        } else {
            let (id, root) = self.root_document(params)?;
            let terminal = terminal_segment(&params.path)
                .ok_or_else(|| anyhow!(StoreError::NotFound))?;
            let steps = nav_steps(params);
            let (new_root, partial) = navigate::append(root, &steps, &terminal, &body)?;
            self.save(&collection, &id, new_root);
            partial
        };

        sanitize_doc(&mut stored);
        Ok(stored)
    }

    async fn update(&self, params: &QueryParams, mode: UpdateMode) -> Result<Value> {
        let collection = required_collection(&params.path)?;
        let body = parse_body(&params.body)?;

        let (id, root) = self.root_document(params)?;
        let steps = nav_steps(params);
        let (new_root, mut partial) = navigate::update(root, &steps, &body, mode)?;
        self.save(&collection, &id, new_root);

        sanitize_doc(&mut partial);
        Ok(partial)
    }

    async fn remove(&self, params: &QueryParams) -> Result<()> {
        let collection = required_collection(&params.path)?;

        if params.path_params.len() == 1 {
            let (id, _) = self.root_document(params)?;
            let mut guard = self.collections.write().unwrap();
            let coll = guard
                .get_mut(&collection)
                .ok_or_else(|| anyhow!(StoreError::NotFound))?;
            coll.docs
                .remove(&id)
                .ok_or_else(|| anyhow!(StoreError::NotFound))?;
            return Ok(());
        }

        let (id, root) = self.root_document(params)?;
        let steps = nav_steps(params);
        let new_root = navigate::remove(root, &steps)?;
        self.save(&collection, &id, new_root);
        Ok(())
    }

    async fn prep(&self, collection: &str, spec: &Spec) -> Result<()> {
        let views = derive_views(collection, spec);
        let mut guard = self.collections.write().unwrap();
        let coll = guard.entry(collection.to_string()).or_default();
        coll.views = views;
        Ok(())
    }

    async fn load_definition(&self, template: &Spec) -> Result<Spec> {
        let guard = self.definitions.read().unwrap();
        match guard.get(SPEC_DOCUMENT) {
            Some(doc) => Ok(serde_json::from_value(doc.clone())?),
            None => Ok(template.clone()),
        }
    }

    async fn save_definition(&self, spec: &Spec) -> Result<()> {
        let mut guard = self.definitions.write().unwrap();
        guard.insert(SPEC_DOCUMENT.to_string(), serde_json::to_value(spec)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::logic::generate::regenerate;
    use crate::logic::induce::induce;
    use crate::model::ParamValue;
    use serde_json::json;

    fn spec_for(sample: &[u8], base: &str) -> Spec {
        let cnf = AppConfig::default();
        let definitions = induce(sample, base, &cnf.container_models()).unwrap();
        let mut spec = cnf.spec_template();
        spec.definitions = definitions;
        regenerate(&mut spec, &cnf);
        spec
    }

    async fn seeded_store() -> (MemoryStore, Spec) {
        let spec = spec_for(
            br#"{"id":1,"status":"open","createdAt":"2024-01-15T00:00:00Z","tags":[{"name":"x","color":"red"}]}"#,
            "post",
        );
        let store = MemoryStore::new();
        store.prep("posts", &spec).await.unwrap();
        (store, spec)
    }

    fn insert_params(body: Value) -> QueryParams {
        let mut params = QueryParams::for_path("/posts");
        params.body = serde_json::to_vec(&body).unwrap();
        params
    }

    fn single_params(id: i64) -> QueryParams {
        let mut params = QueryParams::for_path("/posts/{id}");
        params.path_params.insert("id".into(), ParamValue::Int(id));
        params
    }

    #[tokio::test]
    async fn insert_then_query_round_trips_without_internal_keys() {
        let (store, _) = seeded_store().await;
        let doc = json!({"id": 1, "status": "open", "createdAt": "2024-01-15T00:00:00Z"});

        let stored = store.insert(&insert_params(doc.clone())).await.unwrap();
        assert_eq!(stored, doc);

        let container = store.query(&single_params(1)).await.unwrap();
        assert_eq!(container.meta.count, 1);
        assert_eq!(container.results[0], doc);
        assert_eq!(container.container_type, "PostContainer");
    }

    #[tokio::test]
    async fn query_filters_by_view_and_residually() {
        let (store, _) = seeded_store().await;
        for (id, status, created) in [
            (1, "open", "2024-01-10T00:00:00Z"),
            (2, "open", "2024-02-10T00:00:00Z"),
            (3, "done", "2024-03-10T00:00:00Z"),
        ] {
            let doc = json!({"id": id, "status": status, "createdAt": created});
            store.insert(&insert_params(doc)).await.unwrap();
        }

        let mut params = QueryParams::for_path("/posts");
        params
            .query_params
            .insert("status".into(), ParamValue::Str("open".into()));
        let container = store.query(&params).await.unwrap();
        assert_eq!(container.meta.count, 2);

        let mut params = QueryParams::for_path("/posts");
        params.query_params.insert(
            "createdAtRangeStart".into(),
            ParamValue::Str("2024-01-01T00:00:00Z".into()),
        );
        params.query_params.insert(
            "createdAtRangeEnd".into(),
            ParamValue::Str("2024-02-28T00:00:00Z".into()),
        );
        let container = store.query(&params).await.unwrap();
        assert_eq!(container.meta.count, 2);
    }

    #[tokio::test]
    async fn pagination_respects_limit_and_offset() {
        let (store, _) = seeded_store().await;
        for id in 1..=5 {
            store
                .insert(&insert_params(json!({"id": id, "status": "open"})))
                .await
                .unwrap();
        }

        let mut params = QueryParams::for_path("/posts");
        params.query_params.insert("limit".into(), ParamValue::Int(2));
        params.query_params.insert("offset".into(), ParamValue::Int(1));

        let container = store.query(&params).await.unwrap();
        assert_eq!(container.results.len(), 2);
        assert_eq!(container.meta.offset, 1);
        assert_eq!(container.meta.total, 5);

        let mut params = QueryParams::for_path("/posts");
        params.query_params.insert("limit".into(), ParamValue::Int(0));
        let err = store.query(&params).await.unwrap_err();
        assert_eq!(err.downcast_ref::<StoreError>(), Some(&StoreError::BadLimit));
    }

    #[tokio::test]
    async fn sub_collection_scans_by_prefix() {
        let (store, _) = seeded_store().await;
        store
            .insert(&insert_params(
                json!({"id": 1, "tags": [{"name": "x"}, {"name": "y"}]}),
            ))
            .await
            .unwrap();
        store
            .insert(&insert_params(json!({"id": 2, "tags": [{"name": "z"}]})))
            .await
            .unwrap();

        let mut params = QueryParams::for_path("/posts/{id}/tags");
        params.path_params.insert("id".into(), ParamValue::Int(1));
        let container = store.query(&params).await.unwrap();
        assert_eq!(container.meta.count, 2);
        assert_eq!(container.container_type, "TagContainer");
    }

    #[tokio::test]
    async fn nested_patch_merges_and_returns_the_subnode() {
        let (store, _) = seeded_store().await;
        store
            .insert(&insert_params(
                json!({"id": 1, "tags": [{"name": "x", "color": "red"}]}),
            ))
            .await
            .unwrap();

        let mut params = QueryParams::for_path("/posts/{id}/tags/{name}");
        params.path_params.insert("id".into(), ParamValue::Int(1));
        params
            .path_params
            .insert("name".into(), ParamValue::Str("x".into()));
        params.body = serde_json::to_vec(&json!({"color": "blue"})).unwrap();

        let partial = store.update(&params, UpdateMode::Merge).await.unwrap();
        assert_eq!(partial, json!({"name": "x", "color": "blue"}));

        let container = store.query(&single_params(1)).await.unwrap();
        assert_eq!(
            container.results[0],
            json!({"id": 1, "tags": [{"name": "x", "color": "blue"}]})
        );
    }

    #[tokio::test]
    async fn nested_delete_splices_in_order() {
        let (store, _) = seeded_store().await;
        store
            .insert(&insert_params(
                json!({"id": 1, "tags": [{"name": "a"}, {"name": "b"}, {"name": "c"}]}),
            ))
            .await
            .unwrap();

        let mut params = QueryParams::for_path("/posts/{id}/tags/{name}");
        params.path_params.insert("id".into(), ParamValue::Int(1));
        params
            .path_params
            .insert("name".into(), ParamValue::Str("b".into()));
        store.remove(&params).await.unwrap();

        let container = store.query(&single_params(1)).await.unwrap();
        assert_eq!(
            container.results[0]["tags"],
            json!([{"name": "a"}, {"name": "c"}])
        );
    }

    #[tokio::test]
    async fn missing_documents_surface_not_found() {
        let (store, _) = seeded_store().await;

        let err = store.remove(&single_params(9)).await.unwrap_err();
        assert_eq!(err.downcast_ref::<StoreError>(), Some(&StoreError::NotFound));

        let mut params = single_params(9);
        params.body = b"{}".to_vec();
        let err = store.update(&params, UpdateMode::Merge).await.unwrap_err();
        assert_eq!(err.downcast_ref::<StoreError>(), Some(&StoreError::NotFound));
    }

    #[tokio::test]
    async fn definition_round_trips_with_template_fallback() {
        let cnf = AppConfig::default();
        let template = cnf.spec_template();
        let store = MemoryStore::new();

        let loaded = store.load_definition(&template).await.unwrap();
        assert_eq!(loaded, template);

        let (_, spec) = seeded_store().await;
        store.save_definition(&spec).await.unwrap();
        let loaded = store.load_definition(&template).await.unwrap();
        assert_eq!(loaded, spec);
    }
}
