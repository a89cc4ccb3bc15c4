use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate};
use inflector::Inflector;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::model::{container_name, titlecase, Schema, SchemaMap, CONTAINER_NAME};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,4}$").unwrap());
static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

/// Walks a sample document and produces the schema map for its base type:
/// the type itself, a `{Type}Container`, and every object type transitively
/// reachable from the sample, alongside the seeded base container schemas.
///
/// Multiple occurrences of one object type merge into the union of their
/// properties; a property seen earlier is never overwritten.
pub fn induce(sample: &[u8], base_type: &str, seeds: &SchemaMap) -> Result<SchemaMap> {
    let base = titlecase(base_type);

    let mut map = seeds.clone();
    append_subtype(&base, &mut map);

    let value: Value =
        serde_json::from_slice(sample).context("sample data is not valid JSON")?;

    match &value {
        Value::Object(_) => build_schema(&base, &mut map, &value)?,
        Value::Array(elements) => {
            for element in elements {
                build_schema(&base, &mut map, element)?;
            }
        }
        _ => bail!("sample data must be a JSON object or an array of objects"),
    }

    Ok(map)
}

/// Registers the container schema for a type. Idempotent: an existing
/// container is left untouched.
pub fn append_subtype(base_type: &str, map: &mut SchemaMap) -> String {
    let subtype = container_name(base_type);
    if map.contains_key(&subtype) {
        return subtype;
    }

    let mut results = Schema::of_type("array");
    results.items = Some(Box::new(Schema::reference(base_type)));

    let mut container = Schema {
        title: Some(subtype.clone()),
        description: Some(format!(
            "A container for {}",
            base_type.to_lowercase().to_plural()
        )),
        all_of: vec![Schema::reference(CONTAINER_NAME)],
        ..Default::default()
    };
    container.properties.insert("results".to_string(), results);

    map.insert(subtype.clone(), container);
    subtype
}

fn build_schema(name: &str, map: &mut SchemaMap, value: &Value) -> Result<()> {
    let name = titlecase(name);
    let Value::Object(object) = value else {
        bail!("expected a JSON object for type {}", name);
    };

    if !map.contains_key(&name) {
        map.insert(
            name.clone(),
            Schema {
                title: Some(name.clone()),
                ..Default::default()
            },
        );
    }

    for (key, val) in object {
        let seen = map
            .get(&name)
            .map(|s| s.properties.contains_key(key))
            .unwrap_or(false);
        if !seen {
            build_property(key, &name, map, val)?;
        }
    }
    Ok(())
}

fn build_property(
    prop_name: &str,
    schema_name: &str,
    map: &mut SchemaMap,
    value: &Value,
) -> Result<()> {
    match value {
        Value::Object(_) => {
            build_schema(prop_name, map, value)?;
            let prop = Schema::reference(&titlecase(prop_name));
            insert_property(map, schema_name, prop_name, prop);
        }
        Value::Array(elements) => {
            let prop = build_array_property(prop_name, map, elements)?;
            // array properties always live under a pluralized key
            let key = prop_name.to_singular().to_plural();
            insert_property(map, schema_name, &key, prop);
        }
        Value::String(s) => {
            insert_property(map, schema_name, prop_name, process_string(s));
        }
        Value::Number(n) => {
            insert_property(map, schema_name, prop_name, process_number(n.as_f64()));
        }
        Value::Bool(_) => {
            insert_property(map, schema_name, prop_name, Schema::of_type("boolean"));
        }
        Value::Null => {
            insert_property(map, schema_name, prop_name, Schema::default());
        }
    }
    Ok(())
}

fn insert_property(map: &mut SchemaMap, schema_name: &str, prop_name: &str, prop: Schema) {
    if let Some(schema) = map.get_mut(schema_name) {
        schema.properties.insert(prop_name.to_string(), prop);
    }
}

fn build_array_property(
    prop_name: &str,
    map: &mut SchemaMap,
    elements: &[Value],
) -> Result<Schema> {
    let mut prop = Schema::of_type("array");
    let element_type = prop_name.to_singular();

    for element in elements {
        match element {
            Value::Object(_) => {
                build_schema(&element_type, map, element)?;
                append_subtype(&titlecase(&element_type), map);
                prop.items = Some(Box::new(Schema::reference(&titlecase(&element_type))));
            }
            other => {
                prop.items = Some(Box::new(Schema::of_type(scalar_type(other))));
            }
        }
    }
    Ok(prop)
}

fn scalar_type(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.as_f64().map(|f| f.trunc() == f).unwrap_or(false) {
                "integer"
            } else {
                "number"
            }
        }
        _ => "string",
    }
}

/// Builds a string property, interpreting the content hints sample authors
/// can embed: `a|b|c` enumerations, `lo<>hi` ranges, and well-known formats.
fn process_string(s: &str) -> Schema {
    if let Some((lo, hi)) = s.split_once("<>") {
        return process_range(lo, hi);
    }
    if s.contains('|') {
        return process_split(s);
    }

    let mut prop = Schema::of_type("string");
    prop.format = introspect_format(s);
    prop.example = Some(Value::String(s.to_string()));
    prop
}

fn process_range(lo: &str, hi: &str) -> Schema {
    if let (Ok(a), Ok(b)) = (lo.parse::<i64>(), hi.parse::<i64>()) {
        let mut prop = Schema::of_type("integer");
        prop.minimum = Some(a.min(b) as f64);
        prop.maximum = Some(a.max(b) as f64);
        return prop;
    }
    if let (Ok(a), Ok(b)) = (lo.parse::<f64>(), hi.parse::<f64>()) {
        let mut prop = Schema::of_type("number");
        prop.minimum = Some(a.min(b));
        prop.maximum = Some(a.max(b));
        return prop;
    }
    string_enum(&[lo, hi])
}

fn process_split(s: &str) -> Schema {
    let split: Vec<&str> = s.split('|').collect();

    // a two-entry split that parses numerically is a range hint
    if split.len() == 2 {
        let ints = (split[0].parse::<i64>(), split[1].parse::<i64>());
        if let (Ok(a), Ok(b)) = ints {
            let mut prop = Schema::of_type("integer");
            prop.minimum = Some(a.min(b) as f64);
            prop.maximum = Some(a.max(b) as f64);
            return prop;
        }
        let floats = (split[0].parse::<f64>(), split[1].parse::<f64>());
        if let (Ok(a), Ok(b)) = floats {
            let mut prop = Schema::of_type("number");
            prop.minimum = Some(a.min(b));
            prop.maximum = Some(a.max(b));
            return prop;
        }
    }

    string_enum(&split)
}

fn string_enum(entries: &[&str]) -> Schema {
    let mut prop = Schema::of_type("string");
    prop.enum_ = entries
        .iter()
        .map(|e| Value::String(e.to_string()))
        .collect();
    prop.format = entries.first().and_then(|e| introspect_format(e));
    prop.example = entries.first().map(|e| Value::String(e.to_string()));
    prop
}

fn process_number(value: Option<f64>) -> Schema {
    match value {
        Some(f) if f.trunc() == f => Schema::of_type("integer"),
        _ => Schema::of_type("number"),
    }
}

/// Runs the format detectors in their fixed order: email, uuid, date-time,
/// date. A RFC3339 date-time must win over the plain date detector.
fn introspect_format(s: &str) -> Option<String> {
    if EMAIL_RE.is_match(s) {
        return Some("email".to_string());
    }
    if UUID_RE.is_match(s) {
        return Some("uuid".to_string());
    }
    if DateTime::parse_from_rfc3339(s).is_ok() {
        return Some("date-time".to_string());
    }
    if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
        return Some("date".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;

    fn seeds() -> SchemaMap {
        AppConfig::default().container_models()
    }

    #[test]
    fn infers_a_string_enum() {
        let sample = br#"{"status":"open|closed|done"}"#;
        let map = induce(sample, "ticket", &seeds()).unwrap();

        let status = &map["Ticket"].properties["status"];
        assert_eq!(status.type_.as_deref(), Some("string"));
        assert_eq!(
            status.enum_,
            vec![json!("open"), json!("closed"), json!("done")]
        );
        assert_eq!(status.example, Some(json!("open")));
    }

    #[test]
    fn infers_an_integer_range() {
        let sample = br#"{"age":"0<>120"}"#;
        let map = induce(sample, "person", &seeds()).unwrap();

        let age = &map["Person"].properties["age"];
        assert_eq!(age.type_.as_deref(), Some("integer"));
        assert_eq!(age.minimum, Some(0.0));
        assert_eq!(age.maximum, Some(120.0));
    }

    #[test]
    fn two_entry_integer_split_is_a_range_not_an_enum() {
        let sample = br#"{"level":"1|5"}"#;
        let map = induce(sample, "player", &seeds()).unwrap();

        let level = &map["Player"].properties["level"];
        assert_eq!(level.type_.as_deref(), Some("integer"));
        assert_eq!(level.minimum, Some(1.0));
        assert_eq!(level.maximum, Some(5.0));
        assert!(level.enum_.is_empty());
    }

    #[test]
    fn two_entry_float_split_is_a_number_range() {
        let sample = br#"{"rating":"0.5|9.5"}"#;
        let map = induce(sample, "movie", &seeds()).unwrap();

        let rating = &map["Movie"].properties["rating"];
        assert_eq!(rating.type_.as_deref(), Some("number"));
        assert_eq!(rating.minimum, Some(0.5));
        assert_eq!(rating.maximum, Some(9.5));
    }

    #[test]
    fn format_detectors_run_in_fixed_order() {
        assert_eq!(introspect_format("person@example.com").as_deref(), Some("email"));
        assert_eq!(
            introspect_format("0193a1c2-7b76-4e65-a1f0-9a2b3c4d5e6f").as_deref(),
            Some("uuid")
        );
        assert_eq!(
            introspect_format("2024-01-01T10:30:00Z").as_deref(),
            Some("date-time")
        );
        assert_eq!(introspect_format("2024-01-01").as_deref(), Some("date"));
        assert_eq!(introspect_format("plain text"), None);
    }

    #[test]
    fn numbers_split_into_integer_and_number() {
        let sample = br#"{"count":3,"score":4.5}"#;
        let map = induce(sample, "game", &seeds()).unwrap();

        assert_eq!(
            map["Game"].properties["count"].type_.as_deref(),
            Some("integer")
        );
        assert_eq!(
            map["Game"].properties["score"].type_.as_deref(),
            Some("number")
        );
    }

    #[test]
    fn nested_objects_become_references() {
        let sample = br#"{"author":{"name":"kim","email":"kim@example.com"}}"#;
        let map = induce(sample, "post", &seeds()).unwrap();

        assert_eq!(
            map["Post"].properties["author"].ref_.as_deref(),
            Some("#/definitions/Author")
        );
        let author = &map["Author"];
        assert_eq!(
            author.properties["email"].format.as_deref(),
            Some("email")
        );
    }

    #[test]
    fn arrays_of_objects_register_element_type_and_container() {
        let sample = br#"{"id":1,"tags":[{"name":"x"}]}"#;
        let map = induce(sample, "post", &seeds()).unwrap();

        let tags = &map["Post"].properties["tags"];
        assert!(tags.is_array());
        assert_eq!(tags.item_ref(), Some("Tag"));
        assert!(map.contains_key("Tag"));
        assert!(map.contains_key("TagContainer"));
    }

    #[test]
    fn arrays_of_scalars_record_the_element_type() {
        let sample = br#"{"labels":["a","b"]}"#;
        let map = induce(sample, "post", &seeds()).unwrap();

        let labels = &map["Post"].properties["labels"];
        assert!(labels.is_array());
        assert_eq!(
            labels.items.as_deref().and_then(|i| i.type_.as_deref()),
            Some("string")
        );
    }

    #[test]
    fn every_induced_type_gets_a_container_wired_to_it() {
        let sample = br#"{"id":1,"tags":[{"name":"x"}],"comments":[{"body":"hi"}]}"#;
        let map = induce(sample, "post", &seeds()).unwrap();

        for name in ["Post", "Tag", "Comment"] {
            let container = map
                .get(&container_name(name))
                .unwrap_or_else(|| panic!("missing container for {}", name));
            assert_eq!(
                container.properties["results"].item_ref(),
                Some(name),
                "container for {} must reference it",
                name
            );
        }
    }

    #[test]
    fn repeated_occurrences_union_properties_without_overwriting() {
        let sample = br#"{"items":[{"name":"a"},{"name":"b|c","extra":true}]}"#;
        let map = induce(sample, "order", &seeds()).unwrap();

        let item = &map["Item"];
        // the first occurrence pinned "name" as a plain string
        assert!(item.properties["name"].enum_.is_empty());
        assert_eq!(item.properties["extra"].type_.as_deref(), Some("boolean"));
    }

    #[test]
    fn induction_is_stable_across_serialization() {
        let sample = br#"{"id":1,"status":"open|closed","tags":[{"name":"x"}]}"#;
        let map = induce(sample, "post", &seeds()).unwrap();

        let round_tripped: SchemaMap =
            serde_json::from_str(&serde_json::to_string(&map).unwrap()).unwrap();
        assert_eq!(round_tripped, map);

        let again = induce(sample, "post", &seeds()).unwrap();
        assert_eq!(again, map);
    }

    #[test]
    fn invalid_json_is_fatal() {
        assert!(induce(b"{not json", "thing", &seeds()).is_err());
    }
}
