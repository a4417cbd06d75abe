//! Synchronous Client Tests
//!
//! Tests for the blocking operations over the loopback transport.

use spacekv::{
    AtomicOp, Client, Config, DataType, Filter, MemoryHandle, MemoryTransport, Predicate,
    Primitive, Schema, SpaceError, Value,
};
use spacekv::protocol::Status;

fn phonebook() -> Schema {
    Schema::parse(
        "space phonebook key username attributes first, last, int phone, set(string) tags, list(int) history",
    )
    .unwrap()
}

fn kv() -> Schema {
    Schema::parse("space kv key int k attributes int v, float f, string s").unwrap()
}

fn scores() -> Schema {
    Schema::parse("space scores key user attributes map(string, int) hits, map(string, string) notes")
        .unwrap()
}

fn client() -> (Client, MemoryHandle) {
    let transport = MemoryTransport::with_spaces([phonebook(), kv(), scores()]).unwrap();
    let handle = transport.handle();
    (Client::new(transport), handle)
}

fn put_john(client: &Client) {
    let ok = client
        .put(
            "phonebook",
            "jsmith1",
            [
                ("first", Value::from("John")),
                ("last", Value::from("Smith")),
                ("phone", Value::Int(6075551024)),
            ],
        )
        .unwrap();
    assert!(ok);
}

// =============================================================================
// Put / Get / Delete
// =============================================================================

#[test]
fn test_put_get_round_trip_with_zero_values() {
    let (client, _) = client();
    put_john(&client);

    let record = client.get("phonebook", "jsmith1").unwrap().unwrap();
    assert_eq!(record["first"], Value::from("John"));
    assert_eq!(record["last"], Value::from("Smith"));
    assert_eq!(record["phone"], Value::Int(6075551024));
    assert_eq!(record["tags"], Value::set(Vec::<String>::new()));
    assert_eq!(record["history"], Value::list(Vec::<i64>::new()));
    assert!(!record.contains_key("username"));
}

#[test]
fn test_put_updates_in_place() {
    let (client, _) = client();
    put_john(&client);

    client
        .put("phonebook", "jsmith1", [("first", "Jonathan")])
        .unwrap();

    let record = client.get("phonebook", "jsmith1").unwrap().unwrap();
    assert_eq!(record["first"], Value::from("Jonathan"));
    assert_eq!(record["last"], Value::from("Smith"));
}

#[test]
fn test_get_absent_is_none() {
    let (client, _) = client();
    assert_eq!(client.get("phonebook", "nobody").unwrap(), None);
}

#[test]
fn test_delete_removes() {
    let (client, _) = client();
    put_john(&client);

    assert!(client.delete("phonebook", "jsmith1").unwrap());
    assert_eq!(client.get("phonebook", "jsmith1").unwrap(), None);
    assert!(!client.delete("phonebook", "jsmith1").unwrap());
}

#[test]
fn test_put_if_not_exist() {
    let (client, _) = client();

    assert!(client.put_if_not_exist("kv", 1, [("v", 1)]).unwrap());
    assert!(!client.put_if_not_exist("kv", 1, [("v", 2)]).unwrap());

    let record = client.get("kv", 1).unwrap().unwrap();
    assert_eq!(record["v"], Value::Int(1));
}

#[test]
fn test_get_partial() {
    let (client, _) = client();
    put_john(&client);

    let record = client
        .get_partial("phonebook", "jsmith1", ["first", "phone"])
        .unwrap()
        .unwrap();
    assert_eq!(record.len(), 2);
    assert_eq!(record["first"], Value::from("John"));
    assert_eq!(record["phone"], Value::Int(6075551024));

    assert_eq!(
        client.get_partial("phonebook", "nobody", ["first"]).unwrap(),
        None
    );
}

// =============================================================================
// Conditional Put
// =============================================================================

#[test]
fn test_condput_applies_only_when_condition_holds() {
    let (client, _) = client();
    client
        .put("phonebook", "jsmith1", [("phone", 1234567890)])
        .unwrap();

    let applied = client
        .condput(
            "phonebook",
            "jsmith1",
            Filter::new().with("phone", 1234567890),
            [("first", "Ashik")],
        )
        .unwrap();
    assert!(applied);
    let record = client.get("phonebook", "jsmith1").unwrap().unwrap();
    assert_eq!(record["first"], Value::from("Ashik"));

    let applied = client
        .condput(
            "phonebook",
            "jsmith1",
            Filter::new().with("phone", 5),
            [("first", "Someone")],
        )
        .unwrap();
    assert!(!applied);
    let record = client.get("phonebook", "jsmith1").unwrap().unwrap();
    assert_eq!(record["first"], Value::from("Ashik"));
}

#[test]
fn test_condput_missing_record_is_false() {
    let (client, _) = client();
    let applied = client
        .condput("kv", 9, Filter::new().with("v", 0), [("v", 1)])
        .unwrap();
    assert!(!applied);
    assert_eq!(client.get("kv", 9).unwrap(), None);
}

// =============================================================================
// Atomic Operations
// =============================================================================

#[test]
fn test_atomic_inc_dec() {
    let (client, _) = client();
    client.put("kv", 1, [("v", 10)]).unwrap();

    assert!(client.atomic_inc("kv", 1, [("v", 5)]).unwrap());
    assert_eq!(client.get("kv", 1).unwrap().unwrap()["v"], Value::Int(15));

    assert!(client.atomic_dec("kv", 1, [("v", 20)]).unwrap());
    assert_eq!(client.get("kv", 1).unwrap().unwrap()["v"], Value::Int(-5));
}

#[test]
fn test_atomic_on_missing_record_is_false() {
    let (client, _) = client();
    assert!(!client.atomic_inc("kv", 42, [("v", 1)]).unwrap());
}

#[test]
fn test_atomic_float_and_string() {
    let (client, _) = client();
    client
        .put("kv", 1, [("f", Value::Float(1.5)), ("s", Value::from("world"))])
        .unwrap();

    assert!(client.atomic("kv", 1, AtomicOp::Mul, [("f", 2.0)]).unwrap());
    assert!(client
        .atomic("kv", 1, AtomicOp::StringPrepend, [("s", "hello ")])
        .unwrap());
    assert!(client
        .atomic("kv", 1, AtomicOp::StringAppend, [("s", "!")])
        .unwrap());

    let record = client.get("kv", 1).unwrap().unwrap();
    assert_eq!(record["f"], Value::Float(3.0));
    assert_eq!(record["s"], Value::from("hello world!"));
}

#[test]
fn test_atomic_bitwise_and_mod() {
    let (client, _) = client();
    client.put("kv", 1, [("v", 0b1100)]).unwrap();

    client.atomic("kv", 1, AtomicOp::And, [("v", 0b1010)]).unwrap();
    assert_eq!(client.get("kv", 1).unwrap().unwrap()["v"], Value::Int(0b1000));

    client.atomic("kv", 1, AtomicOp::Xor, [("v", 0b0011)]).unwrap();
    client.atomic("kv", 1, AtomicOp::Mod, [("v", 4)]).unwrap();
    assert_eq!(client.get("kv", 1).unwrap().unwrap()["v"], Value::Int(0b1011 % 4));
}

#[test]
fn test_atomic_collections() {
    let (client, _) = client();
    put_john(&client);

    client
        .atomic("phonebook", "jsmith1", AtomicOp::SetAdd, [("tags", "friend")])
        .unwrap();
    client
        .atomic(
            "phonebook",
            "jsmith1",
            AtomicOp::SetUnion,
            [("tags", Value::set(["work", "friend"]))],
        )
        .unwrap();
    client
        .atomic("phonebook", "jsmith1", AtomicOp::ListRpush, [("history", 2)])
        .unwrap();
    client
        .atomic("phonebook", "jsmith1", AtomicOp::ListLpush, [("history", 1)])
        .unwrap();

    let record = client.get("phonebook", "jsmith1").unwrap().unwrap();
    assert_eq!(record["tags"], Value::set(["friend", "work"]));
    assert_eq!(record["history"], Value::list([1, 2]));

    client
        .atomic("phonebook", "jsmith1", AtomicOp::SetRemove, [("tags", "work")])
        .unwrap();
    let record = client.get("phonebook", "jsmith1").unwrap().unwrap();
    assert_eq!(record["tags"], Value::set(["friend"]));
}

#[test]
fn test_atomic_overflow_is_server_error_and_leaves_record() {
    let (client, _) = client();
    client
        .put("kv", 1, [("v", Value::Int(i64::MAX)), ("f", Value::Float(0.0))])
        .unwrap();

    let err = client
        .atomic_inc("kv", 1, [("v", Value::Int(1)), ("f", Value::Float(1.0))])
        .unwrap_err();
    assert!(matches!(err, SpaceError::Server { status: Status::Overflow, .. }));

    let record = client.get("kv", 1).unwrap().unwrap();
    assert_eq!(record["v"], Value::Int(i64::MAX));
    assert_eq!(record["f"], Value::Float(0.0));
}

#[test]
fn test_map_add_and_remove() {
    let (client, _) = client();
    client.put("scores", "ann", [("hits", Value::map([("go", 1)]))]).unwrap();

    assert!(client
        .atomic("scores", "ann", AtomicOp::MapAdd, [("hits", Value::map([("go", 5), ("rust", 2)]))])
        .unwrap());
    assert!(client
        .atomic("scores", "ann", AtomicOp::MapAdd, [("notes", Value::map([("tmp", "delete me")]))])
        .unwrap());
    let record = client.get("scores", "ann").unwrap().unwrap();
    assert_eq!(record["hits"], Value::map([("go", 5), ("rust", 2)]));
    assert_eq!(record["notes"], Value::map([("tmp", "delete me")]));

    assert!(client
        .atomic("scores", "ann", AtomicOp::MapRemove, [("notes", "tmp")])
        .unwrap());
    // Removing an absent key is not a failure
    assert!(client
        .atomic("scores", "ann", AtomicOp::MapRemove, [("hits", "zig")])
        .unwrap());
    let record = client.get("scores", "ann").unwrap().unwrap();
    assert_eq!(record["notes"], Value::Map(Default::default()));
    assert_eq!(record["hits"], Value::map([("go", 5), ("rust", 2)]));
}

#[test]
fn test_map_entry_ops() {
    let (client, _) = client();
    client
        .put(
            "scores",
            "ann",
            [
                ("hits", Value::map([("go", 16)])),
                ("notes", Value::map([("go", "fast")])),
            ],
        )
        .unwrap();

    let apply = |op: AtomicOp, attr: &str, operand: Value| {
        assert!(client.atomic("scores", "ann", op, [(attr, operand)]).unwrap());
        client.get("scores", "ann").unwrap().unwrap()[attr].clone()
    };

    assert_eq!(apply(AtomicOp::MapAtomicAdd, "hits", Value::map([("go", 16)])), Value::map([("go", 32)]));
    assert_eq!(apply(AtomicOp::MapAtomicSub, "hits", Value::map([("go", -32)])), Value::map([("go", 64)]));
    assert_eq!(apply(AtomicOp::MapAtomicMul, "hits", Value::map([("go", 4)])), Value::map([("go", 256)]));
    assert_eq!(apply(AtomicOp::MapAtomicDiv, "hits", Value::map([("go", 64)])), Value::map([("go", 4)]));
    assert_eq!(apply(AtomicOp::MapAtomicAnd, "hits", Value::map([("go", 2)])), Value::map([("go", 0)]));
    assert_eq!(apply(AtomicOp::MapAtomicOr, "hits", Value::map([("go", 5)])), Value::map([("go", 5)]));
    assert_eq!(apply(AtomicOp::MapAtomicXor, "hits", Value::map([("go", 7)])), Value::map([("go", 2)]));
    assert_eq!(apply(AtomicOp::MapAtomicMod, "hits", Value::map([("go", 2)])), Value::map([("go", 0)]));

    // Absent entries start from zero
    assert_eq!(
        apply(AtomicOp::MapAtomicAdd, "hits", Value::map([("rust", 3)])),
        Value::map([("go", 0), ("rust", 3)])
    );

    assert_eq!(
        apply(AtomicOp::MapStringPrepend, "notes", Value::map([("go", "->")])),
        Value::map([("go", "->fast")])
    );
    assert_eq!(
        apply(AtomicOp::MapStringAppend, "notes", Value::map([("go", "<-"), ("c", "old")])),
        Value::map([("go", "->fast<-"), ("c", "old")])
    );
}

#[test]
fn test_map_op_validation() {
    let (client, handle) = client();

    // Operand values must suit the entry op
    let err = client
        .atomic("scores", "ann", AtomicOp::MapAtomicAdd, [("hits", Value::map([("go", "x")]))])
        .unwrap_err();
    assert!(matches!(err, SpaceError::WrongType { .. }));

    let err = client
        .atomic("scores", "ann", AtomicOp::MapStringAppend, [("hits", Value::map([("go", "x")]))])
        .unwrap_err();
    assert!(matches!(err, SpaceError::WrongType { .. }));

    let err = client
        .atomic("scores", "ann", AtomicOp::MapRemove, [("hits", 1)])
        .unwrap_err();
    assert!(matches!(err, SpaceError::WrongType { .. }));

    let err = client
        .atomic("kv", 1, AtomicOp::MapAdd, [("v", Value::map([("a", 1)]))])
        .unwrap_err();
    assert!(matches!(err, SpaceError::WrongType { .. }));

    assert_eq!(handle.sent_count(), 0);
}

#[test]
fn test_map_entry_div_by_zero_is_overflow() {
    let (client, _) = client();
    client.put("scores", "ann", [("hits", Value::map([("go", 1)]))]).unwrap();

    let err = client
        .atomic("scores", "ann", AtomicOp::MapAtomicDiv, [("hits", Value::map([("go", 0)]))])
        .unwrap_err();
    assert!(matches!(err, SpaceError::Server { status: Status::Overflow, .. }));
    assert_eq!(
        client.get("scores", "ann").unwrap().unwrap()["hits"],
        Value::map([("go", 1)])
    );
}

// =============================================================================
// Count / Group Delete
// =============================================================================

#[test]
fn test_count_and_group_del() {
    let (client, _) = client();
    for i in 0..10 {
        client.put("kv", i, [("v", i % 3)]).unwrap();
    }

    assert_eq!(client.count("kv", Filter::new()).unwrap(), 10);
    assert_eq!(client.count("kv", Filter::new().with("v", 0)).unwrap(), 4);

    assert!(client.group_del("kv", Filter::new().with("v", 0)).unwrap());
    assert_eq!(client.count("kv", Filter::new()).unwrap(), 6);
    assert_eq!(client.get("kv", 3).unwrap(), None);
    assert!(client.get("kv", 4).unwrap().is_some());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_validation_errors_send_nothing() {
    let (client, handle) = client();

    let wrong_type = client.put("kv", 1, [("v", "not a number")]).unwrap_err();
    assert!(matches!(wrong_type, SpaceError::WrongType { .. }));

    let wrong_key = client.get("kv", "one").unwrap_err();
    assert!(matches!(wrong_key, SpaceError::WrongType { .. }));

    let unknown_attr = client.put("kv", 1, [("nope", 1)]).unwrap_err();
    assert!(matches!(unknown_attr, SpaceError::UnknownAttribute { .. }));

    let bad_predicate = client
        .search("kv", Filter::new().with("v", Predicate::regex("x")))
        .unwrap_err();
    assert!(bad_predicate.is_validation());

    let duplicate = client.put("kv", 1, [("v", 1), ("v", 2)]).unwrap_err();
    assert!(matches!(duplicate, SpaceError::DuplicateAttribute(_)));

    let key_write = client.atomic_inc("kv", 1, [("k", 1)]).unwrap_err();
    assert!(key_write.is_validation());

    let bad_op = client
        .atomic("kv", 1, AtomicOp::StringAppend, [("v", 1)])
        .unwrap_err();
    assert!(matches!(bad_op, SpaceError::WrongType { .. }));

    assert_eq!(handle.sent_count(), 0);
}

#[test]
fn test_unknown_space() {
    let (client, handle) = client();
    let err = client.get("missing", 1).unwrap_err();
    assert!(matches!(err, SpaceError::UnknownSpace(ref s) if s == "missing"));
    assert_eq!(handle.sent_count(), 0);
}

#[test]
fn test_attribute_type_lookup() {
    let (client, _) = client();
    assert_eq!(
        client.attribute_type("phonebook", "tags").unwrap(),
        DataType::Set(Primitive::String)
    );
    assert_eq!(
        client.attribute_type("phonebook", "username").unwrap(),
        DataType::String
    );
    assert!(client.attribute_type("phonebook", "age").is_err());
}

#[test]
fn test_configured_schema_takes_precedence() {
    let transport = MemoryTransport::with_spaces([kv()]).unwrap();
    let narrowed = Schema::parse("space kv key int k attributes int v").unwrap();
    let client = Client::with_transport(transport, Config::builder().space(narrowed).build());

    // The client only knows the narrowed schema
    let err = client.put("kv", 1, [("s", "x")]).unwrap_err();
    assert!(matches!(err, SpaceError::UnknownAttribute { .. }));
    assert!(client.put("kv", 1, [("v", 1)]).unwrap());
}

#[test]
fn test_rm_space_forgets_schema() {
    let narrowed = Schema::parse("space kv key int k attributes int v").unwrap();
    let transport = MemoryTransport::with_spaces([kv()]).unwrap();
    let client = Client::with_transport(transport, Config::builder().space(narrowed).build());

    assert!(client.rm_space("kv"));
    assert!(!client.rm_space("kv"));

    // The next lookup goes back to the transport's full description
    assert!(client.put("kv", 1, [("s", "x")]).unwrap());
    assert_eq!(client.attribute_type("kv", "s").unwrap(), DataType::String);
}

// =============================================================================
// Multiple Clients
// =============================================================================

#[test]
fn test_clients_share_store_not_loops() {
    let first = MemoryTransport::with_spaces([kv()]).unwrap();
    let second = MemoryTransport::new(first.store());
    let a = Client::new(first);
    let b = Client::new(second);

    let pending = a.async_put("kv", 1, [("v", 7)]).unwrap();
    assert!(matches!(b.loop_once(), Err(SpaceError::NonePending)));
    assert!(pending.wait().unwrap());

    assert_eq!(b.get("kv", 1).unwrap().unwrap()["v"], Value::Int(7));
}
