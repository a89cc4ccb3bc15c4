use std::collections::{BTreeMap, HashSet};

use inflector::Inflector;
use serde_json::json;

use crate::config::AppConfig;
use crate::model::{
    container_name, titlecase, Header, Items, Operation, Parameter, PathItem, Response, Schema,
    SchemaMap, Spec, CONTAINER_NAME, METALIST_NAME,
};

/// Rebuilds `spec.paths` from `spec.definitions`. Root schemas are those
/// with a container that no other schema embeds as an array element;
/// everything else is reachable as a sub-resource. Deterministic for a
/// given spec.
pub fn regenerate(spec: &mut Spec, cnf: &AppConfig) {
    let roots = root_schemas(&spec.definitions);

    spec.paths.clear();
    for root in roots {
        let path_root = root.to_singular().to_plural().to_lowercase();
        let mut visited = HashSet::new();
        let paths = make_common_apis(
            "",
            &path_root,
            &root,
            &mut spec.definitions,
            &[],
            cnf,
            &mut visited,
        );
        spec.paths.extend(paths);
    }
}

/// Schemas that should be mounted at the API root: inducible types that own
/// a container and are not embedded in another schema as an array element.
fn root_schemas(definitions: &SchemaMap) -> Vec<String> {
    let embedded: HashSet<&str> = definitions
        .values()
        .flat_map(|schema| schema.properties.values())
        .filter_map(|prop| prop.item_ref())
        .collect();

    definitions
        .keys()
        .filter(|name| {
            *name != CONTAINER_NAME
                && *name != METALIST_NAME
                && !name.ends_with(CONTAINER_NAME)
                && definitions.contains_key(&container_name(name))
                && !embedded.contains(name.as_str())
        })
        .cloned()
        .collect()
}

/// Creates the full set of route descriptors for a schema: a collection
/// path (GET, POST, OPTIONS), an item path (GET, PUT, PATCH, DELETE,
/// OPTIONS), and the recursive sub-resource paths for every embedded array
/// of objects. The visited set guards against schema cycles on this call
/// stack.
pub fn make_common_apis(
    prefix: &str,
    path_root: &str,
    schema_name: &str,
    definitions: &mut SchemaMap,
    upstream_params: &[Parameter],
    cnf: &AppConfig,
    visited: &mut HashSet<String>,
) -> BTreeMap<String, PathItem> {
    let mut out = BTreeMap::new();
    if !visited.insert(schema_name.to_string()) {
        return out;
    }

    let (id_name, id_param) = make_path_id(definitions, schema_name);
    let schema = definitions
        .get(schema_name)
        .cloned()
        .unwrap_or_default();

    let collection_path = format!("{}/{}", prefix, path_root);
    let collection = PathItem {
        get: Some(make_collection_operation(
            schema_name,
            &schema,
            upstream_params,
            cnf,
        )),
        post: Some(make_post_operation(schema_name, &schema, upstream_params, cnf)),
        options: Some(make_collection_options_operation(upstream_params)),
        ..Default::default()
    };
    out.insert(collection_path.clone(), collection);

    let mut item_params = upstream_params.to_vec();
    item_params.push(id_param);

    let item_path = format!("{}/{{{}}}", collection_path, id_name);
    let item = PathItem {
        get: Some(make_single_get_operation(schema_name, &item_params, cnf)),
        put: Some(make_put_operation(schema_name, &schema, &item_params, cnf)),
        patch: Some(make_patch_operation(schema_name, &item_params, cnf)),
        delete: Some(make_delete_operation(schema_name, &item_params, cnf)),
        options: Some(make_single_options_operation(&item_params)),
        ..Default::default()
    };
    out.insert(item_path.clone(), item);

    // recurse into arrays of models
    let sub_models: Vec<String> = schema
        .properties
        .values()
        .filter(|prop| prop.is_array())
        .filter_map(|prop| prop.item_ref())
        .map(|name| name.to_string())
        .collect();
    for sub_model in sub_models {
        let sub_root = sub_model.to_singular().to_plural().to_lowercase();
        let sub_apis = make_common_apis(
            &item_path,
            &sub_root,
            &sub_model,
            definitions,
            &item_params,
            cnf,
            visited,
        );
        out.extend(sub_apis);
    }

    visited.remove(schema_name);
    out
}

/// Determines the property used as the path id for single-item routes.
///
/// Scans the schema's properties in sample order: an exact `id`, then a
/// name containing `Id` with a primitive type, then the first primitive
/// property. A schema with no primitive property at all gets a synthesized
/// `{Title}Id` integer written back into the definitions, which the
/// persisted spec keeps.
fn make_path_id(definitions: &mut SchemaMap, schema_name: &str) -> (String, Parameter) {
    if let Some(schema) = definitions.get(schema_name) {
        let primitives: Vec<(&String, &Schema)> = schema
            .properties
            .iter()
            .filter(|(_, prop)| prop.is_primitive())
            .collect();

        let chosen = primitives
            .iter()
            .find(|(name, _)| name.as_str() == "id")
            .or_else(|| primitives.iter().find(|(name, _)| name.contains("Id")))
            .or_else(|| primitives.first());

        if let Some((name, prop)) = chosen {
            let param = Parameter {
                name: name.to_string(),
                in_: "path".to_string(),
                type_: prop.type_.clone(),
                format: prop.format.clone(),
                required: true,
                ..Default::default()
            };
            return (name.to_string(), param);
        }
    }

    // no usable property: synthesize one and record it on the schema
    let title = definitions
        .get(schema_name)
        .and_then(|s| s.title.clone())
        .unwrap_or_else(|| titlecase(schema_name));
    let prop_name = format!("{}Id", title);

    if let Some(schema) = definitions.get_mut(schema_name) {
        let mut synthesized = Schema::of_type("integer");
        synthesized.title = Some(prop_name.clone());
        schema.properties.insert(prop_name.clone(), synthesized);
        schema.required = vec![prop_name.clone()];
    }

    let param = Parameter {
        name: prop_name.clone(),
        in_: "path".to_string(),
        type_: Some("integer".to_string()),
        required: true,
        ..Default::default()
    };
    (prop_name, param)
}

fn container_ref(schema_name: &str) -> Schema {
    Schema::reference(&container_name(schema_name))
}

fn make_collection_operation(
    schema_name: &str,
    schema: &Schema,
    upstream_params: &[Parameter],
    cnf: &AppConfig,
) -> Operation {
    let mut op = Operation {
        operation_id: format!("get{}Collection", schema_name),
        summary: format!(
            "Get multiple {}.",
            schema_name.to_singular().to_plural().to_lowercase()
        ),
        responses: cnf.common_collection_responses(),
        ..Default::default()
    };
    op.responses.insert(
        "200".to_string(),
        Response {
            description: format!("A collection of {}", schema_name),
            schema: Some(container_ref(schema_name)),
            ..Default::default()
        },
    );

    op.parameters = cnf.common_get_params();
    for (prop_name, prop) in &schema.properties {
        match prop.type_.as_deref() {
            // a ref carries no type and is not exposed as a filter
            None => {}
            Some("string") => op.parameters.extend(make_string_params(prop_name, prop)),
            Some("array") => {
                let scalar = prop
                    .items
                    .as_deref()
                    .map(|i| i.type_.is_some() && i.ref_.is_none())
                    .unwrap_or(false);
                if scalar {
                    op.parameters.extend(make_array_params(prop_name, prop));
                }
            }
            Some("number") | Some("integer") => {
                op.parameters.extend(make_num_params(prop_name, prop))
            }
            Some(_) => op.parameters.extend(make_gen_params(prop_name, prop)),
        }
    }
    op.parameters.extend(upstream_params.to_vec());
    op
}

fn make_post_operation(
    schema_name: &str,
    schema: &Schema,
    upstream_params: &[Parameter],
    _cnf: &AppConfig,
) -> Operation {
    let mut op = Operation {
        operation_id: format!("new{}", schema_name),
        summary: format!("Create a new {} object.", schema_name),
        ..Default::default()
    };
    op.responses.insert(
        "201".to_string(),
        Response {
            description: format!("A newly created {}", schema_name),
            schema: Some(container_ref(schema_name)),
            ..Default::default()
        },
    );
    op.parameters.push(Parameter {
        name: "body".to_string(),
        in_: "body".to_string(),
        required: true,
        description: Some(format!("A new {}", schema_name)),
        schema: Some(schema.clone()),
        ..Default::default()
    });
    op.parameters.extend(upstream_params.to_vec());
    op
}

fn make_single_get_operation(
    schema_name: &str,
    upstream_params: &[Parameter],
    cnf: &AppConfig,
) -> Operation {
    let mut op = Operation {
        operation_id: format!("getSingle{}", schema_name),
        summary: format!("Get a single {} object.", schema_name),
        responses: cnf.common_single_responses(),
        ..Default::default()
    };
    op.responses.insert(
        "200".to_string(),
        Response {
            description: format!("A single {}", schema_name),
            schema: Some(container_ref(schema_name)),
            ..Default::default()
        },
    );
    op.parameters.extend(upstream_params.to_vec());
    op
}

fn make_put_operation(
    schema_name: &str,
    schema: &Schema,
    upstream_params: &[Parameter],
    cnf: &AppConfig,
) -> Operation {
    let mut op = Operation {
        operation_id: format!("update{}", schema_name),
        summary: format!("Update a {} object.", schema_name),
        responses: cnf.common_single_responses(),
        ..Default::default()
    };
    op.responses.insert(
        "200".to_string(),
        Response {
            description: format!("Successfully updated {}", schema_name),
            schema: Some(container_ref(schema_name)),
            ..Default::default()
        },
    );
    op.parameters.push(Parameter {
        name: "body".to_string(),
        in_: "body".to_string(),
        required: true,
        description: Some(format!("A replacement {}", schema_name)),
        schema: Some(schema.clone()),
        ..Default::default()
    });
    op.parameters.extend(upstream_params.to_vec());
    op
}

fn make_patch_operation(
    schema_name: &str,
    upstream_params: &[Parameter],
    cnf: &AppConfig,
) -> Operation {
    let mut op = Operation {
        operation_id: format!("updatePartial{}", schema_name),
        summary: format!("Partially update a {} object.", schema_name),
        responses: cnf.common_single_responses(),
        ..Default::default()
    };
    op.responses.insert(
        "200".to_string(),
        Response {
            description: format!("Successfully updated {}", schema_name),
            schema: Some(container_ref(schema_name)),
            ..Default::default()
        },
    );
    op.parameters.push(Parameter {
        name: "body".to_string(),
        in_: "body".to_string(),
        required: true,
        description: Some(format!("A partial {}", schema_name)),
        schema: Some(container_ref(schema_name)),
        ..Default::default()
    });
    op.parameters.extend(upstream_params.to_vec());
    op
}

fn make_delete_operation(
    schema_name: &str,
    upstream_params: &[Parameter],
    cnf: &AppConfig,
) -> Operation {
    let mut op = Operation {
        operation_id: format!("delete{}", schema_name),
        summary: format!("Delete a {} object.", schema_name),
        responses: cnf.common_single_responses(),
        ..Default::default()
    };
    op.responses.insert(
        "200".to_string(),
        Response {
            description: "Successful deletion".to_string(),
            schema: Some(simple_response_schema("200", "Successfully deleted")),
            ..Default::default()
        },
    );
    op.parameters.extend(upstream_params.to_vec());
    op
}

fn allow_header(value: &str) -> BTreeMap<String, Header> {
    let mut headers = BTreeMap::new();
    headers.insert(
        "Allow".to_string(),
        Header {
            type_: Some("string".to_string()),
            default: Some(json!(value)),
        },
    );
    headers
}

fn make_collection_options_operation(upstream_params: &[Parameter]) -> Operation {
    let mut op = Operation::default();
    op.responses.insert(
        "200".to_string(),
        Response {
            description: "This url allows GET and POST operations.".to_string(),
            headers: allow_header("GET, POST"),
            ..Default::default()
        },
    );
    op.parameters = upstream_params.to_vec();
    op
}

fn make_single_options_operation(upstream_params: &[Parameter]) -> Operation {
    let mut op = Operation::default();
    op.responses.insert(
        "200".to_string(),
        Response {
            description: "This url allows GET, PUT, PATCH and DELETE operations.".to_string(),
            headers: allow_header("GET, PUT, DELETE, PATCH"),
            ..Default::default()
        },
    );
    op.parameters = upstream_params.to_vec();
    op
}

fn make_gen_params(prop_name: &str, prop: &Schema) -> Vec<Parameter> {
    vec![Parameter {
        name: prop_name.to_string(),
        in_: "query".to_string(),
        type_: prop.type_.clone(),
        format: prop.format.clone(),
        enum_: prop.enum_.clone(),
        ..Default::default()
    }]
}

fn make_array_params(prop_name: &str, prop: &Schema) -> Vec<Parameter> {
    let items = prop.items.as_deref();
    vec![Parameter {
        name: prop_name.to_string(),
        in_: "query".to_string(),
        type_: items.and_then(|i| i.type_.clone()),
        format: items.and_then(|i| i.format.clone()),
        ..Default::default()
    }]
}

// Numeric properties without an enum get a CSV range parameter alongside
// the equality filter, with bounds inherited from the property.
fn make_num_params(prop_name: &str, prop: &Schema) -> Vec<Parameter> {
    let mut params = Vec::new();

    if prop.enum_.is_empty() {
        params.push(Parameter {
            name: format!("{}Range", prop_name),
            in_: "query".to_string(),
            type_: Some("array".to_string()),
            collection_format: Some("csv".to_string()),
            items: Some(Items {
                type_: prop.type_.clone(),
                format: prop.format.clone(),
                minimum: prop.minimum,
                maximum: prop.maximum,
            }),
            ..Default::default()
        });
    }

    params.push(Parameter {
        name: prop_name.to_string(),
        in_: "query".to_string(),
        type_: prop.type_.clone(),
        format: prop.format.clone(),
        minimum: prop.minimum,
        maximum: prop.maximum,
        enum_: prop.enum_.clone(),
        ..Default::default()
    });
    params
}

// Date and date-time strings also get a CSV range parameter.
fn make_string_params(prop_name: &str, prop: &Schema) -> Vec<Parameter> {
    let mut params = vec![Parameter {
        name: prop_name.to_string(),
        in_: "query".to_string(),
        type_: prop.type_.clone(),
        format: prop.format.clone(),
        enum_: prop.enum_.clone(),
        ..Default::default()
    }];

    let ranged = matches!(prop.format.as_deref(), Some("date") | Some("date-time"));
    if ranged && prop.enum_.is_empty() {
        params.push(Parameter {
            name: format!("{}Range", prop_name),
            in_: "query".to_string(),
            type_: Some("array".to_string()),
            collection_format: Some("csv".to_string()),
            items: Some(Items {
                type_: Some("string".to_string()),
                format: prop.format.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    params
}

fn simple_response_schema(code: &str, message: &str) -> Schema {
    let mut out = Schema::default();
    out.properties
        .insert("code".to_string(), Schema::of_type("integer"));
    out.properties
        .insert("message".to_string(), Schema::of_type("string"));
    out.required = vec!["code".to_string(), "message".to_string()];
    out.example = Some(json!({ "code": code, "message": message }));
    out
}
