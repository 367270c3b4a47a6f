//! Blocking client tests. The mock server runs on its own multi-threaded runtime.

use bubble_api::{blocking, Client, Environment, Error, Query, RetryStrategy};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn start_server(runtime: &Runtime) -> MockServer {
    runtime.block_on(MockServer::start())
}

fn blocking_client(server: &MockServer) -> blocking::Client {
    let client = Client::builder()
        .base_url(server.uri())
        .unwrap()
        .environment(Environment::Live)
        .retry_strategy(RetryStrategy::None)
        .build()
        .unwrap();
    blocking::Client::new(client).unwrap()
}

fn page(start: u64, count: u64, remaining: u64) -> Value {
    let results: Vec<Value> = (start..start + count).map(|n| json!({"n": n})).collect();
    json!({"response": {"results": results, "cursor": start, "count": count, "remaining": remaining}})
}

#[test]
fn test_blocking_crud() {
    let runtime = Runtime::new().unwrap();
    let mock_server = start_server(&runtime);

    runtime.block_on(async {
        Mock::given(method("POST"))
            .and(path("/api/1.1/obj/user"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"status": "success", "id": "1x1"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/1.1/obj/user/1x1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": {"name": "Ada"}})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/api/1.1/obj/user/1x1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;
    });

    let client = blocking_client(&mock_server);
    let id = client.create("user", &json!({"name": "Ada"})).unwrap();
    let user: Value = client.get_by_id("user", &id).unwrap();
    let err = client.delete_by_id("user", &id).unwrap_err();

    assert_eq!(user["name"], "Ada");
    assert!(err.is_not_found());
}

#[test]
fn test_blocking_iterator_walks_pages() {
    let runtime = Runtime::new().unwrap();
    let mock_server = start_server(&runtime);

    runtime.block_on(async {
        for (start, count, remaining) in [(0, 2, 1), (2, 1, 0)] {
            Mock::given(method("GET"))
                .and(query_param("cursor", start.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(page(start, count, remaining)))
                .expect(1)
                .mount(&mock_server)
                .await;
        }
    });

    let client = blocking_client(&mock_server);
    let mut iter = client
        .iter::<Value>("user", Query::new().limit(2))
        .unwrap();
    let things: Vec<Value> = iter.by_ref().map(Result::unwrap).collect();

    assert_eq!(things, vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]);
    assert_eq!(iter.pages_fetched(), 2);
}

#[test]
fn test_blocking_iterator_stops_after_error() {
    let runtime = Runtime::new().unwrap();
    let mock_server = start_server(&runtime);

    runtime.block_on(async {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&mock_server)
            .await;
    });

    let client = blocking_client(&mock_server);
    let mut iter = client.iter::<Value>("user", Query::new()).unwrap();

    assert!(matches!(iter.next(), Some(Err(Error::HttpError { .. }))));
    assert!(iter.next().is_none());
}

#[test]
fn test_blocking_concurrent_fetch() {
    let runtime = Runtime::new().unwrap();
    let mock_server = start_server(&runtime);

    runtime.block_on(async {
        Mock::given(method("GET"))
            .and(query_param("cursor", "0"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 1, 2)))
            .expect(1)
            .mount(&mock_server)
            .await;
        for (start, limit, count, remaining) in [(0, "2", 2, 1), (2, "1", 1, 0)] {
            Mock::given(method("GET"))
                .and(query_param("cursor", start.to_string()))
                .and(query_param("limit", limit))
                .respond_with(ResponseTemplate::new(200).set_body_json(page(start, count, remaining)))
                .expect(1)
                .mount(&mock_server)
                .await;
        }
    });

    let client = blocking_client(&mock_server);
    let things: Vec<Value> = client
        .fetch_all("user", Query::new().limit(2), 4)
        .unwrap();

    assert_eq!(things, vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]);
}
