use askdb_core::{ConversationTurn, Role};
use serde_json::json;

#[test]
fn human_turn_uses_wire_names() {
    let turn = ConversationTurn::human("Top 10 clients by revenue in 2025");
    let value = serde_json::to_value(&turn).unwrap();
    assert_eq!(
        value,
        json!({
            "role": "human",
            "content": "Top 10 clients by revenue in 2025",
            "additional_kwargs": {}
        })
    );
}

#[test]
fn assistant_turn_carries_label_and_payload() {
    let turn = ConversationTurn::assistant("", Default::default(), "intent")
        .with_entry("route", "sql_pipeline");
    let value = serde_json::to_value(&turn).unwrap();
    assert_eq!(value["role"], "ai");
    assert_eq!(value["name"], "intent");
    assert_eq!(value["additional_kwargs"]["route"], "sql_pipeline");
    assert_eq!(turn.payload_str("route"), Some("sql_pipeline"));
    assert!(turn.is_assistant());
}

#[test]
fn null_fields_and_empty_name_deserialize_to_defaults() {
    let turn: ConversationTurn = serde_json::from_value(json!({
        "role": "assistant",
        "content": null,
        "additional_kwargs": null,
        "name": ""
    }))
    .unwrap();
    assert_eq!(turn.role, Role::Assistant);
    assert_eq!(turn.text, "");
    assert!(turn.payload.is_empty());
    assert_eq!(turn.label, None);
}

#[test]
fn missing_optional_fields_are_tolerated() {
    let turn: ConversationTurn = serde_json::from_value(json!({"role": "human"})).unwrap();
    assert_eq!(turn.role, Role::Human);
    assert!(turn.text.is_empty());
}
