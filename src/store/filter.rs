//! Row filters rendered as PostgREST query parameters.

use serde::Serialize;
use serde_json::Value;

/// Filter operations for querying rows.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Field equals value
    Eq,
    /// Field is one of a list of values
    In,
}

/// A filter for querying rows.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Column name to filter on
    pub field: String,
    /// Filter operation
    pub op: FilterOp,
    /// Value to compare against
    pub value: Value,
}

impl Filter {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: serde_json::to_value(value).unwrap_or(Value::Null),
        }
    }

    /// Create a membership filter.
    pub fn in_list<T: Serialize>(field: impl Into<String>, values: &[T]) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::In,
            value: serde_json::to_value(values).unwrap_or(Value::Array(vec![])),
        }
    }

    /// Render as a `(column, "op.value")` query pair.
    pub fn to_query(&self) -> (String, String) {
        let rendered = match &self.op {
            FilterOp::Eq => format!("eq.{}", scalar(&self.value)),
            FilterOp::In => {
                let items = self
                    .value
                    .as_array()
                    .map(|arr| arr.iter().map(quoted).collect::<Vec<_>>().join(","))
                    .unwrap_or_default();
                format!("in.({})", items)
            }
        };
        (self.field.clone(), rendered)
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

// List members are double-quoted so commas and parens inside ids survive
fn quoted(value: &Value) -> String {
    let raw = scalar(value);
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_eq_string() {
        let filter = Filter::eq("bundle_id", "bnd-1");
        assert_eq!(filter.to_query(), ("bundle_id".to_string(), "eq.bnd-1".to_string()));
    }

    #[test]
    fn test_filter_eq_number() {
        let filter = Filter::eq("position", 3);
        assert_eq!(filter.to_query().1, "eq.3");
    }

    #[test]
    fn test_filter_in_list() {
        let filter = Filter::in_list("id", &["web", "files"]);
        assert_eq!(filter.op, FilterOp::In);
        assert_eq!(filter.to_query().1, "in.(\"web\",\"files\")");
    }

    #[test]
    fn test_filter_in_list_escapes_quotes() {
        let filter = Filter::in_list("id", &["a\"b"]);
        assert_eq!(filter.to_query().1, "in.(\"a\\\"b\")");
    }

    #[test]
    fn test_filter_in_empty_list() {
        let empty: [&str; 0] = [];
        assert_eq!(Filter::in_list("id", &empty).to_query().1, "in.()");
    }
}
