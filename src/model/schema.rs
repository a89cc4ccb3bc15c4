use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the base envelope schema every container composes.
pub const CONTAINER_NAME: &str = "Container";

/// Name of the metadata schema referenced by the base container.
pub const METALIST_NAME: &str = "Metalist";

/// Mapping from schema name to schema. Name uniqueness is global; insertion
/// order follows the sample data and is preserved through serialization.
pub type SchemaMap = IndexMap<String, Schema>;

/// A recursive description of one JSON type, in the OpenAPI style.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub ref_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(rename = "allOf", default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<Schema>,
}

impl Schema {
    /// A bare schema of the given primitive type.
    pub fn of_type(type_: &str) -> Self {
        Schema {
            type_: Some(type_.to_string()),
            ..Default::default()
        }
    }

    /// A schema that is only a reference to a named definition.
    pub fn reference(name: &str) -> Self {
        Schema {
            ref_: Some(make_ref(name)),
            ..Default::default()
        }
    }

    pub fn is_array(&self) -> bool {
        self.type_.as_deref() == Some("array")
    }

    pub fn is_ref(&self) -> bool {
        self.ref_.is_some()
    }

    /// True for properties that carry a plain value: not an array, not a
    /// reference to another schema.
    pub fn is_primitive(&self) -> bool {
        !self.is_array() && !self.is_ref() && self.type_.as_deref().unwrap_or("") != ""
    }

    /// The referenced schema name of an array-of-objects property, if any.
    pub fn item_ref(&self) -> Option<&str> {
        self.items
            .as_deref()
            .and_then(|i| i.ref_.as_deref())
            .map(de_ref)
    }
}

/// Builds a `#/definitions/` reference from a schema name.
pub fn make_ref(name: &str) -> String {
    format!("#/definitions/{}", name)
}

/// Strips the `#/definitions/` prefix from a reference, tolerating bare names.
pub fn de_ref(reference: &str) -> &str {
    reference
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(reference)
}

/// Upper-cases the first character, leaving the rest of the string alone.
pub fn titlecase(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// The canonical container name for a schema: `{Name}Container`.
pub fn container_name(schema_name: &str) -> String {
    format!("{}{}", titlecase(schema_name), CONTAINER_NAME)
}

/// Extracts the schema name from its container name.
pub fn modelize_container(container: &str) -> String {
    container.replace(CONTAINER_NAME, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_round_trip() {
        assert_eq!(make_ref("Post"), "#/definitions/Post");
        assert_eq!(de_ref("#/definitions/Post"), "Post");
        assert_eq!(de_ref("Post"), "Post");
    }

    #[test]
    fn titlecase_only_touches_first_char() {
        assert_eq!(titlecase("createdAt"), "CreatedAt");
        assert_eq!(titlecase("post"), "Post");
        assert_eq!(titlecase(""), "");
    }

    #[test]
    fn container_names() {
        assert_eq!(container_name("ticket"), "TicketContainer");
        assert_eq!(modelize_container("TicketContainer"), "Ticket");
    }

    #[test]
    fn schema_serialization_uses_swagger_field_names() {
        let mut schema = Schema::of_type("string");
        schema.enum_ = vec!["open".into(), "closed".into()];
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["type"], "string");
        assert_eq!(json["enum"][0], "open");
        assert!(json.get("properties").is_none());
        assert!(json.get("$ref").is_none());
    }
}
