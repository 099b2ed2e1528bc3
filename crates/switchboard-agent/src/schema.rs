//! Translation of MCP `inputSchema` values into function-declaration schemas.
//!
//! The translation is total: any JSON value produces a schema, and the top
//! level is always an `OBJECT` with `properties` and `required`.

use std::collections::BTreeMap;

use serde_json::Value;
use switchboard_llm::{Schema, SchemaType};

/// Translate a tool's input schema.
pub fn translate(schema: &Value) -> Schema {
    object_schema(schema)
}

fn object_schema(schema: &Value) -> Schema {
    let properties: BTreeMap<String, Schema> = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| (name.clone(), property_schema(name, prop)))
                .collect()
        })
        .unwrap_or_default();

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Schema::object(properties, required)
}

fn property_schema(name: &str, prop: &Value) -> Schema {
    let description = prop
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    node_schema(name, prop).with_description(description)
}

fn node_schema(name: &str, node: &Value) -> Schema {
    match type_tag(node) {
        Some("object") => object_schema(node),
        Some("array") => match node.get("items") {
            Some(items) if items.is_object() => Schema::array(node_schema(name, items)),
            _ => {
                tracing::warn!(
                    property = %name,
                    "array schema has no items; defaulting item type to STRING"
                );
                Schema::array(Schema::of(SchemaType::String))
            }
        },
        other => Schema::of(primitive(other)),
    }
}

/// The node's `type`, taking the first non-null entry of a type list.
fn type_tag(node: &Value) -> Option<&str> {
    match node.get("type")? {
        Value::String(tag) => Some(tag.as_str()),
        Value::Array(tags) => tags
            .iter()
            .filter_map(Value::as_str)
            .find(|tag| *tag != "null"),
        _ => None,
    }
}

fn primitive(tag: Option<&str>) -> SchemaType {
    match tag {
        Some("number") => SchemaType::Number,
        Some("integer") => SchemaType::Integer,
        Some("boolean") => SchemaType::Boolean,
        _ => SchemaType::String,
    }
}
