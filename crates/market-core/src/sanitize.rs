use serde::Serialize;
use serde_json::Value;

/// Serialize `value` into a JSON tree where every non-finite number is
/// `null`, at any depth. `serde_json`'s value serializer performs the mapping
/// itself (`Number::from_f64` rejects NaN and infinities), so the tree can
/// never hold a number JSON cannot represent. Applying it to its own output
/// returns the same value.
pub fn sanitize<T: Serialize + ?Sized>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Nested {
        label: &'static str,
        values: Vec<f64>,
        inner: BTreeMap<&'static str, Option<f64>>,
    }

    #[test]
    fn test_non_finite_becomes_null_at_depth() {
        let mut inner = BTreeMap::new();
        inner.insert("inf", Some(f64::INFINITY));
        inner.insert("neg_inf", Some(f64::NEG_INFINITY));
        inner.insert("ok", Some(2.5));
        inner.insert("missing", None);

        let nested = Nested {
            label: "vix",
            values: vec![1.0, f64::NAN, 3.0],
            inner,
        };

        let value = sanitize(&vec![nested]).unwrap();
        assert_eq!(
            value,
            json!([{
                "label": "vix",
                "values": [1.0, null, 3.0],
                "inner": {"inf": null, "missing": null, "neg_inf": null, "ok": 2.5}
            }])
        );
    }

    #[test]
    fn test_f32_non_finite_becomes_null() {
        let value = sanitize(&(f32::NAN, f32::INFINITY, 1.5f32)).unwrap();
        assert_eq!(value, json!([null, null, 1.5]));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let once = sanitize(&json!({"a": [1, 2.5, {"b": null, "c": "text"}], "d": true})).unwrap();
        let twice = sanitize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_finite_values_untouched() {
        let value = sanitize(&json!({"x": -0.0, "y": 1e300, "z": 42})).unwrap();
        assert_eq!(value["y"], json!(1e300));
        assert_eq!(value["z"], json!(42));
    }
}
