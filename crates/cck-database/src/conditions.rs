use cck_domain::{AttributeCondition, CompareKind, ElementKind, ExistenceKind, Primitive};
use serde_json::{Map, Value};

/// Evaluate one condition against an item's JSON object.
///
/// Value comparisons coerce the attribute to a [`Primitive`] by JSON token
/// type and fail when the attribute is absent. Array-element conditions
/// treat an absent or non-array attribute as containing nothing, so
/// `NotExists` is vacuously true there.
pub fn holds(condition: &AttributeCondition, item: &Map<String, Value>) -> bool {
    match condition {
        AttributeCondition::Existence { op, attribute } => {
            let present = item.contains_key(attribute);
            match op {
                ExistenceKind::Exists => present,
                ExistenceKind::NotExists => !present,
            }
        }
        AttributeCondition::Value { op, attribute, value } => match item.get(attribute) {
            None => false,
            Some(json) => {
                let actual = Primitive::from_json(json);
                match op {
                    CompareKind::Eq => actual == *value,
                    CompareKind::Neq => actual != *value,
                    CompareKind::Gt => actual > *value,
                    CompareKind::Ge => actual >= *value,
                    CompareKind::Lt => actual < *value,
                    CompareKind::Le => actual <= *value,
                }
            }
        },
        AttributeCondition::ArrayElement { op, attribute, element } => {
            let found = item
                .get(attribute)
                .and_then(Value::as_array)
                .map_or(false, |arr| arr.iter().any(|e| Primitive::from_json(e) == *element));
            match op {
                ElementKind::Exists => found,
                ElementKind::NotExists => !found,
            }
        }
    }
}

/// Conditions AND-combine; an empty list always holds.
pub fn all_hold(conditions: &[AttributeCondition], item: &Map<String, Value>) -> bool {
    conditions.iter().all(|c| holds(c, item))
}
