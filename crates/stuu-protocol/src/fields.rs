//! Lenient field access on payload maps.
//!
//! Controllers are loosely typed, so a malformed field never fails the whole
//! request: every accessor returns the caller's fallback when the key is
//! absent, has the wrong type, or (for numbers) is NaN or infinite.

use crate::value::{Map, Value};

/// Fallback-returning accessors for string-keyed maps.
pub trait Fields {
    /// Raw lookup.
    fn field(&self, key: &str) -> Option<&Value>;

    /// Integer field. Finite floats are truncated toward zero.
    fn int_or(&self, key: &str, fallback: i64) -> i64 {
        match self.field(key) {
            Some(Value::Int(n)) => *n,
            Some(Value::Float(n)) if n.is_finite() => *n as i64,
            _ => fallback,
        }
    }

    /// Floating point field. Integers are widened.
    fn float_or(&self, key: &str, fallback: f64) -> f64 {
        match self.field(key).and_then(Value::as_f64) {
            Some(n) if n.is_finite() => n,
            _ => fallback,
        }
    }

    /// Boolean field. Numbers count as true when non-zero.
    fn bool_or(&self, key: &str, fallback: bool) -> bool {
        match self.field(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(n)) => *n != 0,
            Some(Value::Float(n)) if n.is_finite() => *n != 0.0,
            _ => fallback,
        }
    }

    /// String field.
    fn str_or<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.field(key).and_then(Value::as_str).unwrap_or(fallback)
    }

    /// Nested map field.
    fn map_field(&self, key: &str) -> Option<&Map> {
        self.field(key).and_then(Value::as_map)
    }

    /// First key, in order, whose value is a finite number.
    fn first_float(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|key| {
            self.field(key)
                .and_then(Value::as_f64)
                .filter(|n| n.is_finite())
        })
    }

    /// First key, in order, holding a non-empty string.
    fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| {
            self.field(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
    }
}

impl Fields for Map {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Map {
        let value: Value = [
            ("bpm", Value::Float(140.0)),
            ("track_id", Value::Int(3)),
            ("ratio", Value::Float(2.9)),
            ("nan", Value::Float(f64::NAN)),
            ("inf", Value::Float(f64::INFINITY)),
            ("text", Value::from("not a number")),
            ("on", Value::Int(1)),
            ("off", Value::Float(0.0)),
            ("empty", Value::from("")),
        ]
        .into_iter()
        .collect();
        value.into_map().unwrap()
    }

    #[test]
    fn numbers_fall_back_when_unusable() {
        let p = payload();
        assert_eq!(p.float_or("bpm", 1.0), 140.0);
        assert_eq!(p.float_or("track_id", 1.0), 3.0);
        assert_eq!(p.float_or("text", 1.0), 1.0);
        assert_eq!(p.float_or("nan", 1.0), 1.0);
        assert_eq!(p.float_or("inf", 1.0), 1.0);
        assert_eq!(p.float_or("missing", 1.0), 1.0);
    }

    #[test]
    fn ints_truncate_finite_floats() {
        let p = payload();
        assert_eq!(p.int_or("track_id", 0), 3);
        assert_eq!(p.int_or("ratio", 0), 2);
        assert_eq!(p.int_or("nan", 7), 7);
        assert_eq!(p.int_or("text", 7), 7);
    }

    #[test]
    fn bools_accept_numbers() {
        let p = payload();
        assert!(p.bool_or("on", false));
        assert!(!p.bool_or("off", true));
        assert!(p.bool_or("text", true));
    }

    #[test]
    fn strings_and_first_present() {
        let p = payload();
        assert_eq!(p.str_or("text", "x"), "not a number");
        assert_eq!(p.str_or("bpm", "x"), "x");
        assert_eq!(p.first_str(&["empty", "text"]), Some("not a number"));
        assert_eq!(p.first_float(&["text", "nan", "bpm"]), Some(140.0));
        assert_eq!(p.first_float(&["missing"]), None);
        assert!(p.map_field("bpm").is_none());
    }
}
