//! Pagination against a scripted server

mod common;

use common::service;
use jirest_core::{Error, Lifecycle};
use serde_json::{Value, json};

fn page(keys: std::ops::Range<u64>, total: u64, max_results: u64) -> Value {
    let issues: Vec<Value> = keys
        .map(|n| json!({"id": (10000 + n).to_string(), "key": format!("PRJ-{n}"), "fields": {"summary": format!("issue {n}")}}))
        .collect();
    json!({"startAt": 0, "maxResults": max_results, "total": total, "issues": issues})
}

#[test]
fn test_pages_are_fetched_once_in_order() {
    let (transport, service) = service();
    transport.respond("POST", "search", page(0..50, 120, 50));
    transport.respond("POST", "search", page(50..100, 120, 50));
    transport.respond("POST", "search", page(100..120, 120, 50));

    let mut search = service.search();
    search.set_max_results(50);
    assert!(search.start("project = PRJ").unwrap());
    assert_eq!(search.issues().len(), 50);
    assert_eq!(search.total(), Some(120));

    search.load_all().unwrap();
    assert_eq!(search.issues().len(), 120);
    assert_eq!(transport.count("POST", "search"), 3);

    let offsets: Vec<u64> = transport
        .requests()
        .iter()
        .filter_map(|r| r.body.as_ref()?.get("startAt")?.as_u64())
        .collect();
    assert_eq!(offsets, vec![0, 50, 100]);

    search.load_all().unwrap();
    assert_eq!(transport.count("POST", "search"), 3);

    assert_eq!(search.issues()[119].key().as_deref(), Some("PRJ-119"));
    assert_eq!(search.issues()[0].lifecycle(), Lifecycle::Unloaded);
}

#[test]
fn test_query_is_set_once() {
    let (transport, service) = service();
    transport.respond("POST", "search", page(0..2, 2, 50));

    let mut search = service.search();
    assert!(search.start("project = PRJ").unwrap());
    assert!(!search.start("project = OTHER").unwrap());
    assert_eq!(search.jql(), Some("project = PRJ"));
    assert_eq!(transport.total(), 1);

    let body = transport.last_body("POST", "search").unwrap();
    assert_eq!(body["jql"], "project = PRJ");
    assert_eq!(body["validateQuery"], true);
    assert!(body.get("fields").is_none());
}

#[test]
fn test_iteration_fetches_lazily_and_rewinds() {
    let (transport, service) = service();
    transport.respond("POST", "search", page(0..2, 3, 2));
    transport.respond("POST", "search", page(2..3, 3, 2));

    let mut search = service.search();
    search.set_max_results(2);
    search.start("order by key").unwrap();
    assert_eq!(transport.total(), 1);

    let keys: Vec<String> = search
        .by_ref()
        .map(|issue| issue.unwrap().key().unwrap())
        .collect();
    assert_eq!(keys, vec!["PRJ-0", "PRJ-1", "PRJ-2"]);
    assert_eq!(transport.total(), 2);

    search.rewind();
    assert_eq!(search.position(), 0);
    assert_eq!(search.by_ref().count(), 3);
    assert_eq!(transport.total(), 2);
}

#[test]
fn test_server_page_size_wins() {
    let (transport, service) = service();
    transport.respond("POST", "search", page(0..50, 120, 50));

    let mut search = service.search();
    search.set_max_results(100);
    search.start("project = PRJ").unwrap();

    assert_eq!(search.max_results(), 50);
    // a full page at the capped size means more may follow
    transport.respond("POST", "search", page(50..100, 120, 50));
    assert!(search.fetch_next_page().unwrap());
}

#[test]
fn test_start_offset_bounds_the_cursor() {
    let (transport, service) = service();
    transport.respond("POST", "search", page(8..10, 10, 50));

    let mut search = service.search();
    search.set_start_at(8);
    search.start("project = PRJ").unwrap();

    assert_eq!(search.by_ref().count(), 2);
    assert!(!search.fetch_next_page().unwrap());
    assert_eq!(transport.total(), 1);
}

#[test]
fn test_failed_request_ends_iteration() {
    let (transport, service) = service();

    let mut search = service.search();
    assert!(search.start("project = PRJ").unwrap());
    assert_eq!(search.total(), None);
    assert_eq!(search.next().map(|r| r.is_ok()), None);
    assert_eq!(transport.total(), 1);
}

#[test]
fn test_unidentified_result_is_an_error() {
    let (transport, service) = service();
    transport.respond(
        "POST",
        "search",
        json!({"total": 2, "maxResults": 50, "issues": [{"key": "PRJ-1"}, {"fields": {}}]}),
    );

    let mut search = service.search();
    assert!(matches!(
        search.start("project = PRJ"),
        Err(Error::MissingIdentity(_))
    ));
    assert!(search.issues().is_empty());
}

#[test]
fn test_non_object_result_is_a_decode_error() {
    let (transport, service) = service();
    transport.respond(
        "POST",
        "search",
        json!({"total": 2, "maxResults": 50, "issues": [{"key": "PRJ-1"}, 42]}),
    );

    let mut search = service.search();
    match search.start("project = PRJ") {
        Err(Error::Json(e)) => assert!(e.to_string().contains("invalid type")),
        other => panic!("expected a decode error, got {other:?}"),
    }
    assert!(search.issues().is_empty());
    assert_eq!(transport.count("POST", "search"), 1);
}
