//! Helpers for describing tool parameters

use schemars::{JsonSchema, generate::SchemaSettings};

use crate::model::JsonObject;

/// A shortcut for generating a JSON schema for a type.
///
/// Falls back to a bare `{"type": "object"}` if the generated schema is not
/// an object, which only happens for non-struct parameter types.
pub fn schema_for_type<T: JsonSchema>() -> JsonObject {
    // draft 2020-12 is the dialect MCP clients expect for input schemas
    let settings = SchemaSettings::draft2020_12();
    let generator = settings.into_generator();
    let schema = generator.into_root_schema_for::<T>();
    match serde_json::to_value(schema) {
        Ok(serde_json::Value::Object(object)) => object,
        Ok(other) => {
            tracing::warn!(schema = %other, "generated schema is not an object");
            object_schema()
        }
        Err(error) => {
            tracing::warn!(%error, "failed to serialize schema");
            object_schema()
        }
    }
}

fn object_schema() -> JsonObject {
    let mut object = JsonObject::new();
    object.insert("type".into(), "object".into());
    object
}
