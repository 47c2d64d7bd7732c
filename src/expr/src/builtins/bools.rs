//! The `Bool` condition

use crate::condition::{BasicConditionResolver, ConditionHandler};
use crate::value::to_bool;
use serde_json::Value;

/// Passes when the key and the first operand coerce to the same boolean
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolEquals;

impl ConditionHandler for BoolEquals {
    fn test(&self, key_value: &Value, values: &Value) -> bool {
        let expected = match values {
            Value::Array(items) => items.first().and_then(to_bool),
            other => to_bool(other),
        };
        to_bool(key_value).unwrap_or(false) == expected.unwrap_or(false)
    }
}

pub fn conditions() -> BasicConditionResolver {
    BasicConditionResolver::new().condition("Bool", BoolEquals)
}
