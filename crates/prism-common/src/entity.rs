use serde_json::{Map, Value};

/// One object returned by the Prism API (a cluster, host, VM, NIC, ...).
///
/// Kept untyped because the set of reported stats differs between clusters,
/// API versions and even individual entities of the same kind.
pub type Entity = Map<String, Value>;

/// String field of an entity, `None` when absent or not a string.
pub fn str_field<'a>(entity: &'a Entity, key: &str) -> Option<&'a str> {
    entity.get(key).and_then(Value::as_str)
}

/// Nested object field of an entity (`stats`, `usage_stats`, ...).
pub fn object_field<'a>(entity: &'a Entity, key: &str) -> Option<&'a Entity> {
    entity.get(key).and_then(Value::as_object)
}

/// Render a JSON value as a label value.
///
/// Strings are used verbatim, bools become `"true"`/`"false"`, numbers use
/// their JSON form and arrays of scalars are joined with `,`. Null and objects
/// render as the empty string.
pub fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(label_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        Value::Null | Value::Object(_) => String::new(),
    }
}

/// Extract the entity list from a response body that is either a bare array
/// or an object carrying an `entities` array. Non-object elements are dropped.
pub fn entities_from_body(body: Value) -> Vec<Entity> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("entities") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(entity) => Some(entity),
            other => {
                tracing::warn!(value = %other, "skipping non-object entity");
                None
            }
        })
        .collect()
}
