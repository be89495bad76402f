//! Gateway tests against an in-process stub backend
//!
//! The stub mimics a JSON REST store (`/{table}` and `/{table}/{id}`) and
//! records every call it receives with the URL path exactly as it arrived, so
//! the order and encoding of backend calls can be checked.

use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use table_gateway::config::GatewayConfig;
use table_gateway::server::build_app;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct Store {
    tables: HashMap<String, Vec<Value>>,
    calls: Vec<String>,
    bodies: Vec<Value>,
}

type SharedStore = Arc<Mutex<Store>>;

fn id_matches(record: &Value, id: &str) -> bool {
    match &record["id"] {
        Value::Number(n) => n.to_string() == id,
        Value::String(s) => s == id,
        _ => false,
    }
}

fn missing() -> axum::response::Response {
    (StatusCode::NOT_FOUND, Json(json!({}))).into_response()
}

async fn stub_list(
    uri: Uri,
    State(store): State<SharedStore>,
    Path(table): Path<String>,
) -> axum::response::Response {
    let mut store = store.lock().unwrap();
    store.calls.push(format!("GET {}", uri.path()));
    match store.tables.get(&table) {
        Some(records) => Json(Value::Array(records.clone())).into_response(),
        None => missing(),
    }
}

async fn stub_create(
    uri: Uri,
    State(store): State<SharedStore>,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let mut store = store.lock().unwrap();
    store.calls.push(format!("POST {}", uri.path()));
    store.bodies.push(body.clone());
    match store.tables.get_mut(&table) {
        Some(records) => {
            records.push(body.clone());
            (StatusCode::CREATED, Json(body)).into_response()
        }
        None => missing(),
    }
}

async fn stub_record(
    method: Method,
    uri: Uri,
    State(store): State<SharedStore>,
    Path((table, id)): Path<(String, String)>,
    body: Option<Json<Map<String, Value>>>,
) -> axum::response::Response {
    let mut store = store.lock().unwrap();
    store.calls.push(format!("{} {}", method, uri.path()));
    if let Some(Json(body)) = &body {
        store.bodies.push(Value::Object(body.clone()));
    }

    let Some(records) = store.tables.get_mut(&table) else {
        return missing();
    };
    let Some(index) = records.iter().position(|r| id_matches(r, &id)) else {
        return missing();
    };

    if method == Method::GET {
        Json(records[index].clone()).into_response()
    } else if method == Method::PUT {
        let mut replacement = body.map(|Json(b)| b).unwrap_or_default();
        replacement.insert("id".to_string(), records[index]["id"].clone());
        records[index] = Value::Object(replacement);
        Json(records[index].clone()).into_response()
    } else if method == Method::PATCH {
        if let (Some(Json(fields)), Some(record)) = (body, records[index].as_object_mut()) {
            record.extend(fields);
        }
        Json(records[index].clone()).into_response()
    } else if method == Method::DELETE {
        Json(records.remove(index)).into_response()
    } else {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }
}

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service()).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Start a stub backend seeded with `tables` and a gateway in front of it
async fn start(tables: Value, existence_probe: bool) -> (String, SharedStore) {
    let mut store = Store::default();
    if let Value::Object(tables) = tables {
        for (name, records) in tables {
            let records = records.as_array().cloned().unwrap_or_default();
            store.tables.insert(name, records);
        }
    }
    let store = Arc::new(Mutex::new(store));

    let backend = Router::new()
        .route("/:table", get(stub_list).post(stub_create))
        .route(
            "/:table/:id",
            get(stub_record)
                .put(stub_record)
                .patch(stub_record)
                .delete(stub_record),
        )
        .with_state(store.clone());
    let backend_url = spawn(backend).await;

    let mut config = GatewayConfig::default();
    config.backend.url = backend_url;
    config.gateway.existence_probe = existence_probe;
    let gateway_url = spawn(build_app(&config).unwrap()).await;

    (gateway_url, store)
}

fn calls(store: &SharedStore) -> Vec<String> {
    store.lock().unwrap().calls.clone()
}

async fn send(method: Method, url: String, body: Option<Value>) -> (StatusCode, Value) {
    let client = reqwest::Client::new();
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.expect("Failed to send request");
    let status = response.status();
    let body = response.json().await.expect("Response is not JSON");
    (status, body)
}

/// Send a request line verbatim; HTTP clients normalize dot segments away
async fn send_raw(method: &str, gateway: &str, path: &str) -> (StatusCode, Value) {
    let addr = gateway.trim_start_matches("http://");
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8_lossy(&raw);
    let (head, body) = raw.split_once("\r\n\r\n").expect("Malformed response");

    let code = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .expect("Missing status code");
    let status = StatusCode::from_u16(code).unwrap();
    // Small bodies come back with Content-Length, never chunked
    let body = serde_json::from_str(body).expect("Response is not JSON");
    (status, body)
}

#[tokio::test]
async fn test_create_assigns_next_id() {
    let (gateway, store) = start(json!({"users": [{"id": 1}, {"id": 5}]}), true).await;

    let (status, body) = send(
        Method::POST,
        format!("{}/api/users", gateway),
        Some(json!({"name": "Ana"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"code": 0, "data": {"name": "Ana", "id": 6}}));
    assert_eq!(calls(&store), vec!["GET /users", "POST /users"]);
    assert_eq!(
        store.lock().unwrap().bodies,
        vec![json!({"name": "Ana", "id": 6})]
    );
}

#[tokio::test]
async fn test_create_on_empty_table_starts_at_one() {
    let (gateway, _store) = start(json!({"tags": []}), true).await;

    let (status, body) = send(
        Method::POST,
        format!("{}/api/tags", gateway),
        Some(json!({"label": "rust"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], 1);
}

#[tokio::test]
async fn test_create_on_missing_table_fails_without_post() {
    let (gateway, store) = start(json!({}), true).await;

    let (status, body) = send(
        Method::POST,
        format!("{}/api/ghosts", gateway),
        Some(json!({"name": "Boo"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(calls(&store), vec!["GET /ghosts"]);
}

#[tokio::test]
async fn test_list_returns_collection_unmodified() {
    let records = json!([{"id": 2, "title": "b"}, {"id": 1, "title": "a", "tags": ["x"]}]);
    let (gateway, _store) = start(json!({"posts": records.clone()}), true).await;

    let (status, body) = send(Method::GET, format!("{}/api/posts", gateway), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"code": 0, "data": records}));
}

#[tokio::test]
async fn test_get_one() {
    let (gateway, _store) = start(json!({"users": [{"id": 3, "name": "Bo"}]}), true).await;

    let (status, body) = send(Method::GET, format!("{}/api/users/3", gateway), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"code": 0, "data": {"id": 3, "name": "Bo"}}));
}

#[tokio::test]
async fn test_get_missing_record_mirrors_backend_status() {
    let (gateway, _store) = start(json!({"users": [{"id": 1}]}), true).await;

    let (status, body) = send(Method::GET, format!("{}/api/users/999", gateway), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Not Found");
    assert!(body.get("code").is_none());
}

#[tokio::test]
async fn test_replace_probes_same_table() {
    let (gateway, store) = start(json!({"posts": [{"id": 2, "title": "old"}]}), true).await;

    let (status, body) = send(
        Method::PUT,
        format!("{}/api/posts/2", gateway),
        Some(json!({"title": "new"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"id": 2, "title": "new"}));
    assert_eq!(calls(&store), vec!["GET /posts/2", "PUT /posts/2"]);
}

#[tokio::test]
async fn test_replace_missing_record_skips_put() {
    let (gateway, store) = start(json!({"posts": []}), true).await;

    let (status, _) = send(
        Method::PUT,
        format!("{}/api/posts/4", gateway),
        Some(json!({"title": "new"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(calls(&store), vec!["GET /posts/4"]);
}

#[tokio::test]
async fn test_patch_forwards_only_given_fields() {
    let (gateway, store) = start(
        json!({"users": [{"id": 1, "name": "Ana", "age": 30}]}),
        true,
    )
    .await;

    let (status, body) = send(
        Method::PATCH,
        format!("{}/api/users/1", gateway),
        Some(json!({"age": 31})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"code": 0, "data": {"id": 1, "name": "Ana", "age": 31}})
    );
    assert_eq!(calls(&store), vec!["PATCH /users/1"]);
    assert_eq!(store.lock().unwrap().bodies, vec![json!({"age": 31})]);
}

#[tokio::test]
async fn test_delete_reads_then_deletes() {
    let (gateway, store) = start(json!({"users": [{"id": 6, "name": "Ana"}]}), true).await;

    let (status, body) = send(Method::DELETE, format!("{}/api/users/6", gateway), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"code": 0, "data": true}));
    assert_eq!(calls(&store), vec!["GET /users/6", "DELETE /users/6"]);
    assert!(store.lock().unwrap().tables["users"].is_empty());
}

#[tokio::test]
async fn test_delete_missing_record_issues_no_delete() {
    let (gateway, store) = start(json!({"users": [{"id": 1}]}), true).await;

    let (status, body) = send(Method::DELETE, format!("{}/api/users/9", gateway), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(calls(&store), vec!["GET /users/9"]);
    assert_eq!(store.lock().unwrap().tables["users"].len(), 1);
}

#[tokio::test]
async fn test_delete_without_probe_relies_on_backend() {
    let (gateway, store) = start(json!({"users": [{"id": 1}]}), false).await;

    let (status, _) = send(Method::DELETE, format!("{}/api/users/9", gateway), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(calls(&store), vec!["DELETE /users/9"]);

    let (status, body) = send(Method::DELETE, format!("{}/api/users/1", gateway), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], true);
}

#[tokio::test]
async fn test_unmatched_path_reports_requested_url() {
    let (gateway, store) = start(json!({}), true).await;

    let (status, body) = send(Method::GET, format!("{}/v2/users?x=1", gateway), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"success": false, "message": "not found", "path": "/v2/users?x=1"})
    );
    assert!(calls(&store).is_empty());
}

#[tokio::test]
async fn test_encoded_id_reaches_backend_as_one_segment() {
    let (gateway, store) = start(
        json!({"users": [{"id": "a b", "n": 1}, {"id": "a/b", "n": 2}]}),
        true,
    )
    .await;

    let (status, body) = send(Method::GET, format!("{}/api/users/a%20b", gateway), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["n"], 1);

    let (status, body) = send(Method::GET, format!("{}/api/users/a%2Fb", gateway), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["n"], 2);

    assert_eq!(calls(&store), vec!["GET /users/a%20b", "GET /users/a%2Fb"]);
}

#[tokio::test]
async fn test_encoded_table_reaches_backend_as_one_segment() {
    let (gateway, store) = start(json!({"my table": [{"id": 1}]}), true).await;

    let (status, body) = send(Method::GET, format!("{}/api/my%20table", gateway), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{"id": 1}]));
    assert_eq!(calls(&store), vec!["GET /my%20table"]);
}

#[tokio::test]
async fn test_dot_id_deletes_nothing() {
    let (gateway, store) = start(json!({"users": [{"id": 1}, {"id": 2}]}), true).await;

    for path in ["/api/users/..", "/api/users/%2E%2E", "/api/users/%2e"] {
        let (status, body) = send_raw("DELETE", &gateway, path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(
            body,
            json!({"success": false, "message": "not found", "path": path})
        );
    }

    let (status, _) = send_raw("GET", &gateway, "/api/..").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(calls(&store).is_empty());
    assert_eq!(store.lock().unwrap().tables["users"].len(), 2);
}

#[tokio::test]
async fn test_dot_id_without_existence_check_deletes_nothing() {
    let (gateway, store) = start(json!({"users": [{"id": 1}]}), false).await;

    let (status, _) = send_raw("DELETE", &gateway, "/api/users/..").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(calls(&store).is_empty());
    assert_eq!(store.lock().unwrap().tables["users"].len(), 1);
}

#[tokio::test]
async fn test_undecodable_id_gets_envelope() {
    let (gateway, store) = start(json!({"users": [{"id": 1}]}), true).await;

    let (status, body) = send_raw("GET", &gateway, "/api/users/%FF").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "invalid request path");
    assert!(calls(&store).is_empty());
}

#[tokio::test]
async fn test_trailing_slash_forwards_to_collection() {
    let (gateway, store) = start(json!({"posts": [{"id": 1}]}), true).await;

    let (status, body) = send(Method::GET, format!("{}/api/posts/", gateway), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([{"id": 1}]));
    assert_eq!(calls(&store), vec!["GET /posts"]);
}
