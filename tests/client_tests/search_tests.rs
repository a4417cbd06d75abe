//! Search Tests
//!
//! Tests for filtered search, sorted search and iterator lifecycle.

use std::collections::BTreeSet;

use spacekv::protocol::{Response, Status};
use spacekv::{
    Client, Filter, MemoryHandle, MemoryTransport, Predicate, Schema, SearchIterator, SpaceError,
    Value,
};

fn schemas() -> Vec<Schema> {
    vec![
        Schema::parse("space kv key int k attributes int v").unwrap(),
        Schema::parse("space letters key k attributes int n").unwrap(),
        Schema::parse("space words key int k attributes s, list(int) l, set(string) tags").unwrap(),
    ]
}

fn client() -> (Client, MemoryHandle) {
    let transport = MemoryTransport::with_spaces(schemas()).unwrap();
    let handle = transport.handle();
    (Client::new(transport), handle)
}

fn numbers(client: &Client) {
    for i in -2..=2 {
        client.put("kv", i, [("v", i)]).unwrap();
    }
}

fn letters(client: &Client) {
    for (n, k) in ["A", "B", "C", "D", "E"].into_iter().enumerate() {
        client.put("letters", k, [("n", n as i64)]).unwrap();
    }
}

fn words(client: &Client) {
    let rows = [
        (1, "hello", vec![1], vec!["x"]),
        (2, "help", vec![1, 2], vec![]),
        (3, "shell", vec![1, 2, 3], vec!["x", "y"]),
        (4, "", vec![], vec!["y"]),
    ];
    for (k, s, l, tags) in rows {
        client
            .put(
                "words",
                k,
                [
                    ("s", Value::from(s)),
                    ("l", Value::list(l)),
                    ("tags", Value::set(tags)),
                ],
            )
            .unwrap();
    }
}

/// Values of `attr` across every result, as a set
fn column(iter: SearchIterator<'_>, attr: &str) -> BTreeSet<Value> {
    iter.map(|row| row.unwrap()[attr].clone()).collect()
}

fn ints(items: &[i64]) -> BTreeSet<Value> {
    items.iter().map(|i| Value::Int(*i)).collect()
}

// =============================================================================
// Predicate Set Semantics
// =============================================================================

#[test]
fn test_range_scenario() {
    let (client, _) = client();
    numbers(&client);

    let rows: BTreeSet<(Value, Value)> = client
        .search("kv", Filter::new().with("v", Predicate::range(-1, 1)))
        .unwrap()
        .map(|row| {
            let row = row.unwrap();
            (row["k"].clone(), row["v"].clone())
        })
        .collect();

    let expected: BTreeSet<(Value, Value)> = [-1, 0, 1]
        .into_iter()
        .map(|i| (Value::Int(i), Value::Int(i)))
        .collect();
    assert_eq!(rows, expected);
}

#[test]
fn test_less_than_on_key_scenario() {
    let (client, _) = client();
    letters(&client);

    let keys = column(
        client
            .search("letters", Filter::new().with("k", Predicate::lt("C")))
            .unwrap(),
        "k",
    );
    assert_eq!(keys, [Value::from("A"), Value::from("B")].into_iter().collect::<BTreeSet<_>>());
}

#[test]
fn test_comparison_predicates() {
    let (client, _) = client();
    numbers(&client);

    let search = |p: Predicate| column(client.search("kv", Filter::new().with("v", p)).unwrap(), "k");

    assert_eq!(search(Predicate::equals(0)), ints(&[0]));
    assert_eq!(search(Predicate::lt(0)), ints(&[-2, -1]));
    assert_eq!(search(Predicate::le(0)), ints(&[-2, -1, 0]));
    assert_eq!(search(Predicate::gt(0)), ints(&[1, 2]));
    assert_eq!(search(Predicate::ge(0)), ints(&[0, 1, 2]));
    assert_eq!(search(Predicate::range(-2, 2)), ints(&[-2, -1, 0, 1, 2]));
    assert_eq!(search(Predicate::range(1, -1)), ints(&[]));
}

#[test]
fn test_regex_anchored_and_unanchored() {
    let (client, _) = client();
    words(&client);

    let search = |p: &str| {
        column(
            client
                .search("words", Filter::new().with("s", Predicate::regex(p)))
                .unwrap(),
            "k",
        )
    };

    assert_eq!(search("hel"), ints(&[1, 2, 3]));
    assert_eq!(search("^hel"), ints(&[1, 2]));
    assert_eq!(search("ll$"), ints(&[3]));
    assert_eq!(search("^$"), ints(&[4]));
}

#[test]
fn test_length_predicates() {
    let (client, _) = client();
    words(&client);

    let search = |attr: &str, p: Predicate| {
        column(client.search("words", Filter::new().with(attr, p)).unwrap(), "k")
    };

    assert_eq!(search("s", Predicate::length_eq(4)), ints(&[2]));
    assert_eq!(search("s", Predicate::length_le(4)), ints(&[2, 4]));
    assert_eq!(search("s", Predicate::length_ge(5)), ints(&[1, 3]));
    assert_eq!(search("l", Predicate::length_ge(2)), ints(&[2, 3]));
    assert_eq!(search("tags", Predicate::length_eq(0)), ints(&[2]));
}

#[test]
fn test_contains_and_combined_filters() {
    let (client, _) = client();
    words(&client);

    let tagged = column(
        client
            .search("words", Filter::new().with("tags", Predicate::contains("x")))
            .unwrap(),
        "k",
    );
    assert_eq!(tagged, ints(&[1, 3]));

    let both = column(
        client
            .search(
                "words",
                Filter::new()
                    .with("tags", Predicate::contains("y"))
                    .with("l", Predicate::contains(3)),
            )
            .unwrap(),
        "k",
    );
    assert_eq!(both, ints(&[3]));
}

#[test]
fn test_rows_include_key_and_all_attributes() {
    let (client, _) = client();
    client.put("kv", 7, [("v", 70)]).unwrap();

    let rows: Vec<_> = client
        .search("kv", Filter::new())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["k"], Value::Int(7));
    assert_eq!(rows[0]["v"], Value::Int(70));
}

// =============================================================================
// Iterator Lifecycle
// =============================================================================

#[test]
fn test_exhaustion_is_permanent() {
    let (client, _) = client();
    numbers(&client);

    let mut search = client
        .search("kv", Filter::new().with("v", Predicate::gt(1)))
        .unwrap();
    assert!(search.has_next().unwrap());
    assert!(search.has_next().unwrap());
    assert_eq!(search.next_record().unwrap().unwrap()["k"], Value::Int(2));

    assert!(!search.has_next().unwrap());
    assert!(search.is_exhausted());
    assert!(!search.has_next().unwrap());
    assert!(search.next_record().unwrap().is_none());
    assert!(search.next().is_none());
}

#[test]
fn test_empty_search() {
    let (client, _) = client();
    let mut search = client.search("kv", Filter::new()).unwrap();
    assert!(!search.has_next().unwrap());
}

#[test]
fn test_independent_iterators_over_same_filter() {
    let (client, _) = client();
    numbers(&client);
    let filter = Filter::new().with("v", Predicate::ge(0));

    let mut first = client.search("kv", filter.clone()).unwrap();
    let mut second = client.search("kv", filter).unwrap();
    assert_ne!(first.id(), second.id());

    let mut a = BTreeSet::new();
    let mut b = BTreeSet::new();
    loop {
        let x = first.next_record().unwrap();
        let y = second.next_record().unwrap();
        if x.is_none() && y.is_none() {
            break;
        }
        a.extend(x.map(|r| r["k"].clone()));
        b.extend(y.map(|r| r["k"].clone()));
    }
    assert_eq!(a, ints(&[0, 1, 2]));
    assert_eq!(a, b);
}

#[test]
fn test_rows_trickle_in_one_per_poll() {
    let transport = MemoryTransport::with_spaces(schemas()).unwrap().batch_limit(1);
    let handle = transport.handle();
    let client = Client::new(transport);
    numbers(&client);

    let before = handle.poll_count();
    let keys = column(client.search("kv", Filter::new()).unwrap(), "k");
    assert_eq!(keys, ints(&[-2, -1, 0, 1, 2]));
    // Five rows plus the end marker
    assert_eq!(handle.poll_count() - before, 6);
}

#[test]
fn test_dropped_iterator_is_drained_silently() {
    let (client, _) = client();
    numbers(&client);

    let search = client.search("kv", Filter::new()).unwrap();
    assert_eq!(client.pending(), 1);
    drop(search);

    // Rows for the dropped search arrive alongside this get and are discarded
    assert!(client.get("kv", 0).unwrap().is_some());
    assert_eq!(client.pending(), 0);
}

#[test]
fn test_search_interleaves_with_futures() {
    let (client, _) = client();
    numbers(&client);

    let mut search = client.search("kv", Filter::new()).unwrap();
    let put = client.async_put("kv", 9, [("v", 9)]).unwrap();

    let mut seen = 0;
    while search.next_record().unwrap().is_some() {
        seen += 1;
    }
    assert_eq!(seen, 5);
    assert!(put.is_resolved());
    assert_eq!(client.loop_once().unwrap(), put);
}

#[test]
fn test_server_error_ends_search() {
    let (client, handle) = client();
    numbers(&client);
    handle.pause();

    let mut search = client.search("kv", Filter::new()).unwrap();
    handle.inject(search.id(), Response::error(Status::ServerError, "disk on fire"));

    let err = search.next().unwrap().unwrap_err();
    assert!(matches!(err, SpaceError::Server { status: Status::ServerError, .. }));
    assert!(search.next().is_none());

    // The held rows now belong to nobody
    handle.resume();
    assert!(client.get("kv", 0).unwrap().is_some());
}

// =============================================================================
// Sorted Search
// =============================================================================

#[test]
fn test_sorted_search_orders_and_limits() {
    let (client, _) = client();
    numbers(&client);

    let ascending: Vec<Value> = client
        .sorted_search("kv", Filter::new(), "v", 3, false)
        .unwrap()
        .map(|r| r.unwrap()["v"].clone())
        .collect();
    assert_eq!(ascending, vec![Value::Int(-2), Value::Int(-1), Value::Int(0)]);

    let descending: Vec<Value> = client
        .sorted_search("kv", Filter::new().with("v", Predicate::lt(2)), "v", 2, true)
        .unwrap()
        .map(|r| r.unwrap()["v"].clone())
        .collect();
    assert_eq!(descending, vec![Value::Int(1), Value::Int(0)]);
}

#[test]
fn test_sorted_search_rejects_unordered_attribute() {
    let (client, handle) = client();
    let err = client
        .sorted_search("words", Filter::new(), "tags", 10, false)
        .unwrap_err();
    assert!(matches!(err, SpaceError::WrongType { .. }));
    assert_eq!(handle.sent_count(), 0);
}
