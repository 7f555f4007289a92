//! Documents stored in tables.

use serde_json::{Map, Value};

/// A stored record: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Typed accessors over [`Document`] fields.
pub trait DocumentExt {
    /// Returns the string `id` field, if present and non-empty.
    fn id(&self) -> Option<&str>;

    /// Reads a field as epoch milliseconds.
    ///
    /// Integer and floating point JSON numbers are accepted; anything else
    /// (including `null` and a missing field) yields `None`.
    fn millis(&self, field: &str) -> Option<i64>;

    /// Reads a field as a flag. Missing and `null` read as `false`.
    fn flag(&self, field: &str) -> bool;
}

impl DocumentExt for Document {
    fn id(&self) -> Option<&str> {
        self.get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    fn millis(&self, field: &str) -> Option<i64> {
        match self.get(field)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            _ => None,
        }
    }

    fn flag(&self, field: &str) -> bool {
        match self.get(field) {
            Some(Value::Bool(b)) => *b,
            // SQLite-backed clients send booleans as 0/1.
            Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn id_requires_non_empty_string() {
        assert_eq!(doc(json!({"id": "p1"})).id(), Some("p1"));
        assert_eq!(doc(json!({"id": ""})).id(), None);
        assert_eq!(doc(json!({"id": 42})).id(), None);
        assert_eq!(doc(json!({})).id(), None);
    }

    #[test]
    fn millis_accepts_integers_and_floats() {
        let d = doc(json!({"a": 100, "b": 1.7e12, "c": "100", "d": null}));
        assert_eq!(d.millis("a"), Some(100));
        assert_eq!(d.millis("b"), Some(1_700_000_000_000));
        assert_eq!(d.millis("c"), None);
        assert_eq!(d.millis("d"), None);
        assert_eq!(d.millis("missing"), None);
    }

    #[test]
    fn flag_reads_bools_and_numbers() {
        let d = doc(json!({"t": true, "f": false, "one": 1, "zero": 0, "n": null}));
        assert!(d.flag("t"));
        assert!(!d.flag("f"));
        assert!(d.flag("one"));
        assert!(!d.flag("zero"));
        assert!(!d.flag("n"));
        assert!(!d.flag("missing"));
    }
}
