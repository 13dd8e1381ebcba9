use serde_json::{Number, Value};

/// Structural equality over JSON snapshots.
///
/// Object key order is ignored and numbers compare by value, so `500` and `500.0` are equal.
/// Callers pass sparse tracked-path snapshots of the same shape, never whole documents.
pub fn deep_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, value)| right.get(key).is_some_and(|other| deep_equal(value, other)))
        }
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left.iter().zip(right).all(|(value, other)| deep_equal(value, other))
        }
        (Value::Number(left), Value::Number(right)) => numbers_equal(left, right),
        _ => left == right,
    }
}

/// Integers compare exactly; floats only come into play when either side is one.
fn numbers_equal(left: &Number, right: &Number) -> bool {
    if let (Some(left), Some(right)) = (left.as_i64(), right.as_i64()) {
        return left == right;
    }
    if let (Some(left), Some(right)) = (left.as_u64(), right.as_u64()) {
        return left == right;
    }
    if !left.is_f64() && !right.is_f64() {
        // One side is negative and the other exceeds i64::MAX.
        return false;
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::deep_equal;

    #[test]
    fn key_order_does_not_matter() {
        let left = json!({"ispInfo": {"mrc": "500", "otc": "0"}, "siteName": "Hilltop"});
        let right = json!({"siteName": "Hilltop", "ispInfo": {"otc": "0", "mrc": "500"}});
        assert!(deep_equal(&left, &right));
    }

    #[test]
    fn extra_keys_break_equality_in_either_direction() {
        let left = json!({"ispInfo": {"mrc": "500"}});
        let right = json!({"ispInfo": {"mrc": "500", "otc": "0"}});
        assert!(!deep_equal(&left, &right));
        assert!(!deep_equal(&right, &left));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(deep_equal(&json!({"amount": 500}), &json!({"amount": 500.0})));
        assert!(!deep_equal(&json!({"amount": 500}), &json!({"amount": "500"})));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let above = json!({"ispInfo": {"numberOfMonths": 9_007_199_254_740_993_i64}});
        let below = json!({"ispInfo": {"numberOfMonths": 9_007_199_254_740_992_i64}});
        assert!(!deep_equal(&above, &below));
        assert!(deep_equal(&above, &above.clone()));
        assert!(!deep_equal(&json!(u64::MAX), &json!(u64::MAX - 1)));
        assert!(!deep_equal(&json!(-1), &json!(u64::MAX)));
    }

    #[test]
    fn null_differs_from_empty_object_and_string() {
        assert!(!deep_equal(&json!(null), &json!({})));
        assert!(!deep_equal(&json!(null), &json!("")));
        assert!(deep_equal(&json!(null), &json!(null)));
    }

    #[test]
    fn arrays_are_order_sensitive() {
        assert!(deep_equal(&json!(["admin", "staff"]), &json!(["admin", "staff"])));
        assert!(!deep_equal(&json!(["admin", "staff"]), &json!(["staff", "admin"])));
    }
}
