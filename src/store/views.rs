use std::cmp::Ordering;
use std::collections::BTreeMap;

use inflector::Inflector;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::logic::coerce::{RANGE_END, RANGE_START};
use crate::logic::paths::{collection_name, path_pairs, type_name, view_segments};
use crate::model::{
    container_name, de_ref, modelize_container, titlecase, Container, ContainerMeta, QueryParams,
    Spec,
};
use crate::store::traits::sanitize_doc;

/// Canonical view name for values passed through path parameters.
pub fn path_view_name(template: &str) -> String {
    let segments: Vec<String> = view_segments(template)
        .into_iter()
        .map(|(segment, _)| segment)
        .collect();
    format!("by_path_{}", segments.join("_"))
}

/// Canonical view name for GET query filters.
pub fn query_view_name(param: &str) -> String {
    format!("by_query_{}", param)
}

/// One level of a composite path view below the root document: the cased
/// property holding the nested array and the discriminating parameter.
/// A `pos` parameter emits the array index instead of a property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStep {
    pub property: String,
    pub param: String,
}

/// A secondary index derived from the specification's paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewSpec {
    /// Indexes documents by one property: `emit(doc[prop], doc)`.
    Query { property: String },
    /// Indexes documents (or nested elements) by path discriminators. An
    /// empty chain emits `(doc[root_param], doc)`; a non-empty chain emits
    /// a composite key of one element per level.
    Path {
        root_param: String,
        chain: Vec<ChainStep>,
    },
}

impl ViewSpec {
    /// Renders the JavaScript map function installed in the store's design
    /// document.
    pub fn map_function(&self) -> String {
        match self {
            ViewSpec::Query { property } => {
                format!("function(doc){{ emit(doc.{}, doc); }}", property)
            }
            ViewSpec::Path { root_param, chain } if chain.is_empty() => {
                format!("function(doc){{ emit(doc.{}, doc); }}", root_param)
            }
            ViewSpec::Path { root_param, chain } => {
                let mut vars = vec!["doc".to_string()];
                let mut keys = vec![format!("doc.{}", root_param)];
                let mut open = String::new();
                let mut close = String::new();

                for step in chain {
                    let var = step.property.to_singular();
                    let parent = vars.last().unwrap().clone();
                    if step.param == "pos" {
                        open.push_str(&format!(
                            "{}.{}.forEach(function({},{}Index){{ ",
                            parent, step.property, var, var
                        ));
                        keys.push(format!("({}Index).toString()", var));
                    } else {
                        open.push_str(&format!(
                            "{}.{}.forEach(function({}){{ ",
                            parent, step.property, var
                        ));
                        keys.push(format!("{}.{}", var, step.param));
                    }
                    close.push_str("}); ");
                    vars.push(var);
                }

                format!(
                    "function(doc){{ {}emit([{}],{}); {}}}",
                    open,
                    keys.join(","),
                    vars.last().unwrap(),
                    close
                )
            }
        }
    }
}

/// Derives the named views for one collection from the spec's paths.
///
/// Only fully parameterized GET templates contribute path views; a partial
/// template such as `/posts/{id}/tags` shares its view name with the deeper
/// `/posts/{id}/tags/{name}` template, whose composite view serves both the
/// exact-key and the prefix-scan query shapes.
pub fn derive_views(collection: &str, spec: &Spec) -> BTreeMap<String, ViewSpec> {
    let mut views = BTreeMap::new();

    for (path, item) in &spec.paths {
        if collection_name(path).as_deref() != Some(collection) {
            continue;
        }
        let Some(get) = item.get.as_ref() else {
            continue;
        };

        let pairs = path_pairs(path);
        let segments = view_segments(path);
        if !pairs.is_empty() && pairs.len() == segments.len() {
            let mut model = pairs[0].segment.to_singular().to_title_case();
            let mut chain = Vec::new();
            for pair in &pairs[1..] {
                let (property, next_model) = find_property_from_path(&model, &pair.segment, spec);
                chain.push(ChainStep {
                    property,
                    param: pair.param.clone(),
                });
                if let Some(next) = next_model {
                    model = next;
                }
            }
            views.insert(
                path_view_name(path),
                ViewSpec::Path {
                    root_param: pairs[0].param.clone(),
                    chain,
                },
            );
        }

        // query views index root documents by one filterable property
        let response_model = get
            .responses
            .get("200")
            .and_then(|r| r.schema.as_ref())
            .and_then(|s| s.ref_.as_deref())
            .map(|r| modelize_container(de_ref(r)));
        let Some(model_name) = response_model else {
            continue;
        };
        let Some(model) = spec.definitions.get(&model_name) else {
            continue;
        };
        for param in get.parameters.iter().filter(|p| p.in_ == "query") {
            let Some(prop) = model.properties.get(&param.name) else {
                continue;
            };
            if prop.is_array() {
                continue;
            }
            views.insert(
                query_view_name(&param.name),
                ViewSpec::Query {
                    property: param.name.clone(),
                },
            );
        }
    }

    views
}

// Resolves a path segment to the cased property name on the model it
// descends through, advancing to the element type of that property.
fn find_property_from_path(model: &str, segment: &str, spec: &Spec) -> (String, Option<String>) {
    if let Some(schema) = spec.definitions.get(model) {
        let lowered = segment.to_lowercase();
        for (name, prop) in &schema.properties {
            if name.to_lowercase() == lowered {
                return (name.clone(), prop.item_ref().map(|r| r.to_string()));
            }
        }
    }
    (segment.to_string(), None)
}

/// A CouchDB-style design document carrying rendered views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub language: String,
    pub views: BTreeMap<String, MapView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub map: String,
}

pub const DESIGN_DOC_ID: &str = "_design/core";

/// Builds the design document for a collection. Deterministic for a given
/// spec, so `prep` can install it idempotently.
pub fn design_document(collection: &str, spec: &Spec) -> DesignDoc {
    let views = derive_views(collection, spec)
        .into_iter()
        .map(|(name, view)| {
            (
                name,
                MapView {
                    map: view.map_function(),
                },
            )
        })
        .collect();
    DesignDoc {
        id: DESIGN_DOC_ID.to_string(),
        rev: None,
        language: "javascript".to_string(),
        views,
    }
}

/// Options for one view query, mirroring the store's query knobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewOpts {
    pub key: Option<Value>,
    pub startkey: Option<Value>,
    pub endkey: Option<Value>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    pub descending: bool,
    pub include_docs: bool,
}

/// One row of a view result.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    pub id: String,
    pub key: Value,
    pub value: Value,
}

/// Pulls `limit` and `offset` out of the query parameters, defaulting to
/// 10 and 0.
pub fn set_limit_and_offset(params: &mut QueryParams) -> (i64, i64) {
    let mut limit = 10;
    let mut offset = 0;

    if let Some(value) = params.query_params.remove("limit") {
        if let crate::model::ParamValue::Int(n) = value {
            limit = n;
        }
    }
    if let Some(value) = params.query_params.remove("offset") {
        if let crate::model::ParamValue::Int(n) = value {
            offset = n;
        }
    }
    (limit, offset)
}

/// Selects the view for a query and fills in its options.
///
/// Path parameters win over query parameters. Pagination is pushed down to
/// the view only when no residual query filters remain; otherwise it is
/// applied after filtering. Consumed query parameters are removed from
/// `params`.
pub fn pick_view<F>(
    params: &mut QueryParams,
    view_exists: F,
    limit: i64,
    offset: i64,
) -> (String, ViewOpts)
where
    F: Fn(&str) -> bool,
{
    let mut opts = ViewOpts::default();

    if params.query_params.is_empty() {
        opts.limit = Some(limit);
        opts.skip = Some(offset);
    }

    if params.path_params.is_empty() {
        if !params.query_params.is_empty() {
            if let Some(view) = find_query_view(params, &mut opts, &view_exists) {
                if params.query_params.is_empty() {
                    opts.limit = Some(limit);
                    opts.skip = Some(offset);
                }
                return (view, opts);
            }
        }
        return (path_view_name(&params.path), opts);
    }

    let segments = view_segments(&params.path);
    if params.path_params.len() == 1 && segments.len() == 1 {
        opts.key = params.path_params.values().next().map(|v| v.to_value());
        return (path_view_name(&params.path), opts);
    }

    let fully_parameterized = segments.iter().all(|(_, param)| param.is_some());
    let key: Vec<Value> = segments
        .iter()
        .filter_map(|(_, param)| param.as_ref())
        .filter_map(|param| params.path_params.get(param))
        .map(|v| v.to_value())
        .collect();

    if fully_parameterized {
        opts.key = Some(Value::Array(key));
    } else {
        // open-ended scan over everything under the addressed prefix
        opts.startkey = Some(Value::Array(key.clone()));
        let mut end = key;
        end.push(json!({}));
        opts.endkey = Some(Value::Array(end));
    }
    (path_view_name(&params.path), opts)
}

// Finds a query view to consume one filter (or one range pair). Mutates
// both the options and the remaining query parameters.
fn find_query_view<F>(params: &mut QueryParams, opts: &mut ViewOpts, view_exists: &F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    let names: Vec<String> = params.query_params.keys().cloned().collect();

    for name in names {
        let mut consumed = vec![name.clone()];
        let base;

        if let Some(stripped) = name.strip_suffix(RANGE_START) {
            base = stripped.to_string();
            let counterpart = format!("{}{}", base, RANGE_END);
            opts.startkey = params.query_params.get(&name).map(|v| v.to_value());
            opts.endkey = match params.query_params.get(&counterpart) {
                Some(value) => {
                    consumed.push(counterpart);
                    Some(value.to_value())
                }
                // no upper bound: scan to the end of the index
                None => Some(json!({})),
            };
        } else if let Some(stripped) = name.strip_suffix(RANGE_END) {
            base = stripped.to_string();
            let counterpart = format!("{}{}", base, RANGE_START);
            match params.query_params.get(&counterpart) {
                Some(start) => {
                    opts.startkey = Some(start.to_value());
                    opts.endkey = params.query_params.get(&name).map(|v| v.to_value());
                    consumed.push(counterpart);
                }
                None => {
                    // no lower bound: walk the index downward from the end
                    opts.startkey = params.query_params.get(&name).map(|v| v.to_value());
                    opts.descending = true;
                }
            }
        } else {
            base = name.clone();
        }

        let view = query_view_name(&base);
        if view_exists(&view) {
            if base == name {
                opts.key = params.query_params.get(&name).map(|v| v.to_value());
            }
            for consumed_name in consumed {
                params.query_params.remove(&consumed_name);
            }
            return Some(view);
        }

        // view missing: leave the params for residual filtering
        opts.key = None;
        opts.startkey = None;
        opts.endkey = None;
        opts.descending = false;
    }
    None
}

/// Applies residual equality filters to rows a view returned.
pub fn filter_result_set(rows: Vec<ViewRow>, params: &QueryParams) -> Vec<ViewRow> {
    if params.query_params.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            params.query_params.iter().all(|(name, expected)| {
                row.value
                    .get(name)
                    .map(|field| expected.matches(field))
                    .unwrap_or(false)
            })
        })
        .collect()
}

/// Slices a filtered result set to one page.
pub fn paginate(rows: Vec<ViewRow>, limit: i64, offset: i64) -> Vec<ViewRow> {
    let offset = offset.max(0) as usize;
    if offset >= rows.len() {
        return Vec::new();
    }
    let end = (offset + limit.max(0) as usize).min(rows.len());
    rows[offset..end].to_vec()
}

/// Executes a view over in-memory documents, producing rows ordered by key.
pub fn execute_view(view: &ViewSpec, docs: &[(String, Value)]) -> Vec<ViewRow> {
    let mut rows = Vec::new();

    for (id, doc) in docs {
        match view {
            ViewSpec::Query { property } => rows.push(ViewRow {
                id: id.clone(),
                key: doc.get(property).cloned().unwrap_or(Value::Null),
                value: doc.clone(),
            }),
            ViewSpec::Path { root_param, chain } if chain.is_empty() => rows.push(ViewRow {
                id: id.clone(),
                key: doc.get(root_param).cloned().unwrap_or(Value::Null),
                value: doc.clone(),
            }),
            ViewSpec::Path { root_param, chain } => {
                let root_key = doc.get(root_param).cloned().unwrap_or(Value::Null);
                emit_chain(id, doc, vec![root_key], chain, &mut rows);
            }
        }
    }

    rows.sort_by(|a, b| collate(&a.key, &b.key));
    rows
}

fn emit_chain(
    id: &str,
    node: &Value,
    key_prefix: Vec<Value>,
    chain: &[ChainStep],
    rows: &mut Vec<ViewRow>,
) {
    let step = &chain[0];
    let Some(Value::Array(items)) = node.get(&step.property) else {
        return;
    };

    for (index, item) in items.iter().enumerate() {
        let mut key = key_prefix.clone();
        if step.param == "pos" {
            key.push(Value::String(index.to_string()));
        } else {
            key.push(item.get(&step.param).cloned().unwrap_or(Value::Null));
        }

        if chain.len() == 1 {
            rows.push(ViewRow {
                id: id.to_string(),
                key: Value::Array(key),
                value: item.clone(),
            });
        } else {
            emit_chain(id, item, key, &chain[1..], rows);
        }
    }
}

/// Applies key selection, ordering, skip and limit the way the document
/// store would. Returns the view's total row count alongside the page.
pub fn apply_opts(mut rows: Vec<ViewRow>, opts: &ViewOpts) -> (i64, Vec<ViewRow>) {
    let total = rows.len() as i64;

    if opts.descending {
        rows.reverse();
    }

    if let Some(key) = &opts.key {
        rows.retain(|row| collate(&row.key, key) == Ordering::Equal);
    } else {
        if let Some(start) = &opts.startkey {
            rows.retain(|row| {
                let ord = collate(&row.key, start);
                if opts.descending {
                    ord != Ordering::Greater
                } else {
                    ord != Ordering::Less
                }
            });
        }
        if let Some(end) = &opts.endkey {
            rows.retain(|row| {
                let ord = collate(&row.key, end);
                if opts.descending {
                    ord != Ordering::Less
                } else {
                    ord != Ordering::Greater
                }
            });
        }
    }

    if let Some(skip) = opts.skip {
        let skip = skip.max(0) as usize;
        rows = if skip >= rows.len() {
            Vec::new()
        } else {
            rows.split_off(skip)
        };
    }
    if let Some(limit) = opts.limit {
        rows.truncate(limit.max(0) as usize);
    }

    (total, rows)
}

/// Assembles the response envelope for a page of rows, stripping
/// store-internal keys from every document.
pub fn assemble_container(
    path: &str,
    rows: Vec<ViewRow>,
    total: i64,
    limit: i64,
    offset: i64,
) -> Container {
    let results = rows
        .into_iter()
        .map(|row| {
            let mut doc = row.value;
            sanitize_doc(&mut doc);
            doc
        })
        .collect();

    let mut container = Container::ok(container_name(&titlecase(&type_name(path))), results);
    container.meta = ContainerMeta {
        total,
        offset,
        limit,
        ..container.meta
    };
    container
}

/// Key ordering in the store's collation: null < booleans < numbers <
/// strings < arrays < objects. An empty object is the conventional
/// upper-bound sentinel for open-ended scans.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                let ord = collate(ex, ey);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::logic::generate::regenerate;
    use crate::logic::induce::induce;
    use crate::model::ParamValue;

    fn spec_for(sample: &[u8], base: &str) -> Spec {
        let cnf = AppConfig::default();
        let definitions = induce(sample, base, &cnf.container_models()).unwrap();
        let mut spec = cnf.spec_template();
        spec.definitions = definitions;
        regenerate(&mut spec, &cnf);
        spec
    }

    #[test]
    fn derives_path_and_query_views_for_a_collection() {
        let spec = spec_for(
            br#"{"id":1,"status":"open","tags":[{"name":"x"}]}"#,
            "post",
        );
        let views = derive_views("posts", &spec);

        assert!(matches!(
            views.get("by_path_posts"),
            Some(ViewSpec::Path { root_param, chain }) if root_param == "id" && chain.is_empty()
        ));
        assert!(matches!(
            views.get("by_path_posts_tags"),
            Some(ViewSpec::Path { root_param, chain })
                if root_param == "id" && chain.len() == 1 && chain[0].param == "name"
        ));
        assert!(views.contains_key("by_query_status"));
        // array properties do not get query views
        assert!(!views.contains_key("by_query_tags"));
    }

    #[test]
    fn composite_views_render_nested_foreach_map_functions() {
        let view = ViewSpec::Path {
            root_param: "id".to_string(),
            chain: vec![ChainStep {
                property: "tags".to_string(),
                param: "name".to_string(),
            }],
        };
        assert_eq!(
            view.map_function(),
            "function(doc){ doc.tags.forEach(function(tag){ emit([doc.id,tag.name],tag); }); }"
        );
    }

    #[test]
    fn pos_discriminators_emit_the_array_index() {
        let view = ViewSpec::Path {
            root_param: "id".to_string(),
            chain: vec![ChainStep {
                property: "steps".to_string(),
                param: "pos".to_string(),
            }],
        };
        let map = view.map_function();
        assert!(map.contains("(stepIndex).toString()"));
    }

    #[test]
    fn design_document_is_deterministic() {
        let spec = spec_for(br#"{"id":1,"tags":[{"name":"x"}]}"#, "post");
        assert_eq!(design_document("posts", &spec), design_document("posts", &spec));
    }

    #[test]
    fn single_path_param_queries_by_plain_key() {
        let mut params = QueryParams::for_path("/posts/{id}");
        params.path_params.insert("id".into(), ParamValue::Int(1));

        let (view, opts) = pick_view(&mut params, |_| true, 10, 0);
        assert_eq!(view, "by_path_posts");
        assert_eq!(opts.key, Some(serde_json::json!(1)));
    }

    #[test]
    fn nested_path_params_query_by_composite_key() {
        let mut params = QueryParams::for_path("/posts/{id}/tags/{name}");
        params.path_params.insert("id".into(), ParamValue::Int(1));
        params
            .path_params
            .insert("name".into(), ParamValue::Str("x".into()));

        let (view, opts) = pick_view(&mut params, |_| true, 10, 0);
        assert_eq!(view, "by_path_posts_tags");
        assert_eq!(opts.key, Some(serde_json::json!([1, "x"])));
    }

    #[test]
    fn partial_templates_scan_by_prefix() {
        let mut params = QueryParams::for_path("/posts/{id}/tags");
        params.path_params.insert("id".into(), ParamValue::Int(1));

        let (view, opts) = pick_view(&mut params, |_| true, 10, 0);
        assert_eq!(view, "by_path_posts_tags");
        assert_eq!(opts.key, None);
        assert_eq!(opts.startkey, Some(serde_json::json!([1])));
        assert_eq!(opts.endkey, Some(serde_json::json!([1, {}])));
    }

    #[test]
    fn range_pair_selects_the_query_view_and_consumes_both_params() {
        let mut params = QueryParams::for_path("/posts");
        params.query_params.insert(
            "createdAtRangeStart".into(),
            ParamValue::Str("2024-01-01T00:00:00Z".into()),
        );
        params.query_params.insert(
            "createdAtRangeEnd".into(),
            ParamValue::Str("2024-02-01T00:00:00Z".into()),
        );

        let (view, opts) = pick_view(&mut params, |name| name == "by_query_createdAt", 10, 0);
        assert_eq!(view, "by_query_createdAt");
        assert_eq!(opts.startkey, Some(serde_json::json!("2024-01-01T00:00:00Z")));
        assert_eq!(opts.endkey, Some(serde_json::json!("2024-02-01T00:00:00Z")));
        assert!(params.query_params.is_empty());
        assert!(!opts.descending);
    }

    #[test]
    fn range_end_alone_scans_descending() {
        let mut params = QueryParams::for_path("/posts");
        params.query_params.insert(
            "createdAtRangeEnd".into(),
            ParamValue::Str("2024-02-01T00:00:00Z".into()),
        );

        let (view, opts) = pick_view(&mut params, |name| name == "by_query_createdAt", 10, 0);
        assert_eq!(view, "by_query_createdAt");
        assert!(opts.descending);
        assert_eq!(opts.startkey, Some(serde_json::json!("2024-02-01T00:00:00Z")));
    }

    #[test]
    fn range_start_alone_scans_to_the_end() {
        let mut params = QueryParams::for_path("/posts");
        params.query_params.insert(
            "ageRangeStart".into(),
            ParamValue::Int(30),
        );

        let (_, opts) = pick_view(&mut params, |name| name == "by_query_age", 10, 0);
        assert_eq!(opts.startkey, Some(serde_json::json!(30)));
        assert_eq!(opts.endkey, Some(serde_json::json!({})));
    }

    #[test]
    fn unmatched_filters_stay_for_residual_filtering() {
        let mut params = QueryParams::for_path("/posts");
        params
            .query_params
            .insert("status".into(), ParamValue::Str("open".into()));
        params
            .query_params
            .insert("title".into(), ParamValue::Str("x".into()));

        let (view, opts) = pick_view(&mut params, |name| name == "by_query_status", 10, 0);
        assert_eq!(view, "by_query_status");
        assert_eq!(opts.key, Some(serde_json::json!("open")));
        // the unconsumed filter still applies in memory, so pagination was
        // not pushed down
        assert_eq!(params.query_params.len(), 1);
        assert!(opts.limit.is_none());
    }

    #[test]
    fn residual_filter_is_a_conjunction() {
        let rows = vec![
            ViewRow {
                id: "1".into(),
                key: Value::Null,
                value: serde_json::json!({"status": "open", "title": "a"}),
            },
            ViewRow {
                id: "2".into(),
                key: Value::Null,
                value: serde_json::json!({"status": "open", "title": "b"}),
            },
        ];
        let mut params = QueryParams::for_path("/posts");
        params
            .query_params
            .insert("status".into(), ParamValue::Str("open".into()));
        params
            .query_params
            .insert("title".into(), ParamValue::Str("b".into()));

        let kept = filter_result_set(rows, &params);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "2");
    }

    #[test]
    fn executes_composite_views_over_documents() {
        let view = ViewSpec::Path {
            root_param: "id".to_string(),
            chain: vec![ChainStep {
                property: "tags".to_string(),
                param: "name".to_string(),
            }],
        };
        let docs = vec![(
            "d1".to_string(),
            serde_json::json!({"id": 1, "tags": [{"name": "x"}, {"name": "y"}]}),
        )];

        let rows = execute_view(&view, &docs);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, serde_json::json!([1, "x"]));
        assert_eq!(rows[0].value, serde_json::json!({"name": "x"}));
    }

    #[test]
    fn prefix_scan_selects_all_nested_elements() {
        let view = ViewSpec::Path {
            root_param: "id".to_string(),
            chain: vec![ChainStep {
                property: "tags".to_string(),
                param: "name".to_string(),
            }],
        };
        let docs = vec![
            (
                "d1".to_string(),
                serde_json::json!({"id": 1, "tags": [{"name": "x"}, {"name": "y"}]}),
            ),
            (
                "d2".to_string(),
                serde_json::json!({"id": 2, "tags": [{"name": "z"}]}),
            ),
        ];

        let rows = execute_view(&view, &docs);
        let opts = ViewOpts {
            startkey: Some(serde_json::json!([1])),
            endkey: Some(serde_json::json!([1, {}])),
            ..Default::default()
        };
        let (_, page) = apply_opts(rows, &opts);
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|r| r.key[0] == serde_json::json!(1)));
    }

    #[test]
    fn pagination_slices_after_the_offset() {
        let rows: Vec<ViewRow> = (0..5)
            .map(|i| ViewRow {
                id: i.to_string(),
                key: serde_json::json!(i),
                value: Value::Null,
            })
            .collect();

        let page = paginate(rows.clone(), 2, 1);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "1");

        assert!(paginate(rows, 2, 9).is_empty());
    }

    #[test]
    fn collation_orders_types_then_values() {
        assert_eq!(collate(&Value::Null, &serde_json::json!(1)), Ordering::Less);
        assert_eq!(
            collate(&serde_json::json!(2), &serde_json::json!(10)),
            Ordering::Less
        );
        assert_eq!(
            collate(&serde_json::json!("a"), &serde_json::json!({})),
            Ordering::Less
        );
        assert_eq!(
            collate(&serde_json::json!([1, "a"]), &serde_json::json!([1, {}])),
            Ordering::Less
        );
    }
}
