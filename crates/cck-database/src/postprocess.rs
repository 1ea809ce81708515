use cck_domain::{DatabaseOptions, DbKey, Primitive};
use serde_json::{Map, Value};

/// Re-inject the key attribute into a body about to be returned. The key is
/// never stored redundantly inside the body, so reads put it back here.
pub fn inject_key(body: &mut Map<String, Value>, key: &DbKey) {
    body.insert(key.name.clone(), key.value.to_json());
}

/// Apply the instance options to a returned JSON tree in place.
pub fn apply(options: DatabaseOptions, value: &mut Value) {
    if !options.auto_sort_arrays && !options.auto_convert_roundable_float_to_int {
        return;
    }
    walk(options, value);
}

fn walk(options: DatabaseOptions, value: &mut Value) {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                walk(options, child);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                walk(options, child);
            }
            if options.auto_sort_arrays {
                // Deterministic order via the primitive ordering; objects and
                // nested arrays compare through their canonical stringification.
                items.sort_by(|a, b| Primitive::from_json(a).cmp(&Primitive::from_json(b)));
            }
        }
        Value::Number(n) => {
            if options.auto_convert_roundable_float_to_int && !n.is_i64() && !n.is_u64() {
                if let Some(d) = n.as_f64() {
                    if d.is_finite()
                        && d == d.round()
                        && d >= i64::MIN as f64
                        && d <= i64::MAX as f64
                    {
                        *value = Value::from(d as i64);
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_sort_by_primitive_order() {
        let options = DatabaseOptions { auto_sort_arrays: true, ..Default::default() };
        let mut value = json!({ "tags": ["db", "api", "cache"], "nested": { "n": [3, 1, 2] } });
        apply(options, &mut value);
        assert_eq!(value["tags"], json!(["api", "cache", "db"]));
        assert_eq!(value["nested"]["n"], json!([1, 2, 3]));
    }

    #[test]
    fn roundable_floats_render_as_integers() {
        let options =
            DatabaseOptions { auto_convert_roundable_float_to_int: true, ..Default::default() };
        let mut value = json!({ "a": 3.0, "b": 3.5, "c": 3 });
        apply(options, &mut value);
        assert_eq!(value, json!({ "a": 3, "b": 3.5, "c": 3 }));
    }

    #[test]
    fn no_options_leaves_value_untouched() {
        let mut value = json!({ "n": [3, 1, 2], "f": 2.0 });
        apply(DatabaseOptions::default(), &mut value);
        assert_eq!(value, json!({ "n": [3, 1, 2], "f": 2.0 }));
    }
}
