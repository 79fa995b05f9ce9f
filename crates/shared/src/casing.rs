//! Payload key-case conversion
//!
//! The server speaks snake_case, the application works in camelCase. Only
//! object keys are rewritten; values, array order and array length are left
//! untouched.

use serde_json::{Map, Value};

/// Convert a camelCase key to snake_case
///
/// A leading uppercase letter is kept as-is so the conversion stays
/// reversible through [`to_camel_case`].
pub fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() && !out.is_empty() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a snake_case key to camelCase
///
/// Leading underscores and underscores not followed by a lowercase letter are
/// preserved.
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '_' && !out.is_empty() {
            if let Some(next) = chars.peek().copied().filter(char::is_ascii_lowercase) {
                chars.next();
                out.push(next.to_ascii_uppercase());
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Rewrite every object key in `value` to snake_case (outbound direction)
pub fn keys_to_snake(value: Value) -> Value {
    convert_keys(value, &to_snake_case)
}

/// Rewrite every object key in `value` to camelCase (inbound direction)
pub fn keys_to_camel(value: Value) -> Value {
    convert_keys(value, &to_camel_case)
}

fn convert_keys(value: Value, convert: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, inner)| (convert(&key), convert_keys(inner, convert)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| convert_keys(item, convert))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_key_conversion() {
        assert_eq!(to_snake_case("conversationId"), "conversation_id");
        assert_eq!(to_snake_case("assignedAgentId"), "assigned_agent_id");
        assert_eq!(to_snake_case("content"), "content");
        assert_eq!(to_camel_case("conversation_id"), "conversationId");
        assert_eq!(to_camel_case("_private"), "_private");
        assert_eq!(to_camel_case("line_1"), "line_1");
    }

    #[test]
    fn test_nested_payload_conversion() {
        let payload = json!({
            "conversationId": 42,
            "lastMessage": { "senderName": "Ada", "isInternal": false },
            "participants": [{ "userId": "u1" }, { "userId": "u2" }],
            "tags": ["vipCustomer", null],
        });

        let wire = keys_to_snake(payload.clone());
        assert_eq!(
            wire,
            json!({
                "conversation_id": 42,
                "last_message": { "sender_name": "Ada", "is_internal": false },
                "participants": [{ "user_id": "u1" }, { "user_id": "u2" }],
                "tags": ["vipCustomer", null],
            })
        );
        assert_eq!(keys_to_camel(wire), payload);
    }

    #[test]
    fn test_payload_without_matching_keys_is_unchanged() {
        let payload = json!({ "content": "hello", "count": 3, "items": [1, 2, 3] });
        assert_eq!(keys_to_snake(payload.clone()), payload);
        assert_eq!(keys_to_camel(payload.clone()), payload);
    }

    fn camel_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,5}([A-Z][a-z0-9]{0,5}){0,3}"
    }

    fn payload() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z_ ]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map(camel_key(), inner, 0..6)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_outbound_then_inbound_is_identity(value in payload()) {
            prop_assert_eq!(keys_to_camel(keys_to_snake(value.clone())), value);
        }
    }
}
