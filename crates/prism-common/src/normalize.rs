use serde_json::Value;

/// Turn an upstream stat key into a Prometheus-safe metric name fragment.
///
/// `.` and `-` become `_` and the result is lowercased, so
/// `storage.capacity_bytes` yields `storage_capacity_bytes`. Applying it twice
/// gives the same result as applying it once.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            other => other,
        })
        .collect::<String>()
        .to_lowercase()
}

/// Convert a JSON value into a float.
///
/// Numbers are returned as-is and numeric strings are parsed. `None` means the
/// value is unavailable (null, unparseable string, bool, array or object),
/// which is distinct from a reported zero.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::trace!(value = %s, error = %e, "non-numeric string value");
                None
            }
        },
        Value::Null => None,
        other => {
            tracing::trace!(value = %other, "unsupported value type");
            None
        }
    }
}

/// Like [`value_to_f64`], but Prism's `-1` "not available this cycle" marker
/// is treated as unavailable too.
pub fn stat_value(value: &Value) -> Option<f64> {
    value_to_f64(value).filter(|v| *v != -1.0)
}
