//! Schema Tests
//!
//! Tests for schema construction, the text form and write validation.

use spacekv::{Attributes, DataType, Primitive, Schema, SpaceError, Value};

fn phonebook() -> Schema {
    Schema::parse(
        "space phonebook
         key username
         attributes first, last, int phone, set(string) tags",
    )
    .unwrap()
}

// =============================================================================
// Parsing Tests
// =============================================================================

#[test]
fn test_parse_untyped_attributes_are_strings() {
    let schema = phonebook();

    assert_eq!(schema.name(), "phonebook");
    assert_eq!(schema.key_name(), "username");
    assert_eq!(schema.key_type(), DataType::String);
    assert_eq!(schema.attribute_type("first"), Some(DataType::String));
    assert_eq!(schema.attribute_type("phone"), Some(DataType::Int));
    assert_eq!(
        schema.attribute_type("tags"),
        Some(DataType::Set(Primitive::String))
    );
    assert_eq!(schema.attribute_type("missing"), None);
}

#[test]
fn test_parse_typed_key_and_containers() {
    let schema = Schema::parse(
        "space kv key int k attributes map(string, float) scores, list(int) history",
    )
    .unwrap();

    assert_eq!(schema.key_type(), DataType::Int);
    assert_eq!(
        schema.attribute_type("scores"),
        Some(DataType::Map(Primitive::String, Primitive::Float))
    );
    assert_eq!(
        schema.attribute_type("history"),
        Some(DataType::List(Primitive::Int))
    );
}

#[test]
fn test_parse_ignores_placement_clauses() {
    let schema = Schema::parse(
        "space kv key k attributes v subspace v create 8 partitions tolerate 2 failures",
    )
    .unwrap();
    assert_eq!(schema.attributes().len(), 1);
}

#[test]
fn test_parse_display_reparses() {
    let schema = phonebook();
    let reparsed = Schema::parse(&schema.to_string()).unwrap();
    assert_eq!(reparsed, schema);
}

#[test]
fn test_parse_rejects_container_key() {
    let err = Schema::parse("space kv key list(int) k").unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_parse_rejects_duplicate_attribute() {
    let err = Schema::parse("space kv key k attributes a, int a").unwrap_err();
    assert!(matches!(err, SpaceError::DuplicateAttribute(ref a) if a == "a"));
}

#[test]
fn test_parse_rejects_garbage() {
    assert!(Schema::parse("space kv").is_err());
    assert!(Schema::parse("space kv key k attributes a banana(").is_err());
}

// =============================================================================
// Builder Tests
// =============================================================================

#[test]
fn test_builder_requires_key() {
    let err = Schema::builder("kv")
        .attribute("v", DataType::Int)
        .build()
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_zero_record() {
    let schema = phonebook();
    let zero = schema.zero_record();

    assert_eq!(zero["first"], Value::from(""));
    assert_eq!(zero["phone"], Value::Int(0));
    assert_eq!(zero["tags"], Value::set(Vec::<String>::new()));
    assert!(!zero.contains_key("username"));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_validate_key_type() {
    let schema = phonebook();
    assert!(schema.validate_key(&Value::from("jsmith1")).is_ok());
    assert!(matches!(
        schema.validate_key(&Value::Int(1)),
        Err(SpaceError::WrongType { .. })
    ));
}

#[test]
fn test_validate_attributes() {
    let schema = phonebook();

    let mut attrs = Attributes::new();
    attrs.insert("phone".to_string(), Value::Int(5551024));
    assert!(schema.validate_attributes(&attrs).is_ok());

    attrs.insert("phone".to_string(), Value::from("555-1024"));
    assert!(matches!(
        schema.validate_attributes(&attrs),
        Err(SpaceError::WrongType { ref attribute, .. }) if attribute == "phone"
    ));

    let mut unknown = Attributes::new();
    unknown.insert("nickname".to_string(), Value::from("J"));
    assert!(matches!(
        schema.validate_attributes(&unknown),
        Err(SpaceError::UnknownAttribute { .. })
    ));

    let mut key = Attributes::new();
    key.insert("username".to_string(), Value::from("x"));
    assert!(schema.validate_attributes(&key).is_err());
}

#[test]
fn test_set_elements_must_conform() {
    let schema = phonebook();
    let mut attrs = Attributes::new();
    attrs.insert("tags".to_string(), Value::set([1, 2]));

    assert!(schema.validate_attributes(&attrs).is_err());
}

#[test]
fn test_datatype_from_str() {
    assert_eq!("int64".parse::<DataType>().unwrap(), DataType::Int);
    assert_eq!(
        "map(string,int)".parse::<DataType>().unwrap(),
        DataType::Map(Primitive::String, Primitive::Int)
    );
    assert!("tree(int)".parse::<DataType>().is_err());
}
