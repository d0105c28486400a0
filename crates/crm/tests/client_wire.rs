//! Wire-level tests for [`CrmClient`] against a loopback stub of the CRM.
//!
//! The stub is a plain axum router bound to an ephemeral port; each test
//! wires up only the routes it needs and records what actually arrived on
//! the socket, so assertions cover the real request bytes rather than the
//! client's internal bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use leadbridge_core::{AdapterError, CrmConfig};
use leadbridge_crm::{CrmClient, PageQuery};
use secrecy::SecretString;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[derive(Clone, Debug)]
struct RecordedRequest {
    authorization: Option<String>,
    query: HashMap<String, String>,
    body: Value,
}

impl Recorder {
    async fn record(&self, headers: &HeaderMap, query: HashMap<String, String>, body: Value) {
        let authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.requests.lock().await.push(RecordedRequest { authorization, query, body });
    }

    async fn take(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub serve");
    });
    format!("http://{addr}")
}

fn client_for(base_url: &str, timeout_secs: u64) -> CrmClient {
    let config = CrmConfig {
        api_key: SecretString::from("test-key"),
        base_url: base_url.to_string(),
        timeout_secs,
    };
    CrmClient::new(&config).expect("client")
}

#[tokio::test]
async fn list_people_sends_basic_auth_and_pagination() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/people",
            get(
                |State(recorder): State<Recorder>,
                 headers: HeaderMap,
                 Query(query): Query<HashMap<String, String>>| async move {
                    recorder.record(&headers, query, Value::Null).await;
                    Json(json!({"people": []}))
                },
            ),
        )
        .with_state(recorder.clone());
    let base_url = spawn(router).await;

    let client = client_for(&base_url, 5);
    client
        .list_people(PageQuery { limit: 500, offset: 20 }, &[])
        .await
        .expect("list people");

    let requests = recorder.take().await;
    assert_eq!(requests.len(), 1);
    // "test-key:" in the basic-auth scheme the CRM requires.
    assert_eq!(requests[0].authorization.as_deref(), Some("Basic dGVzdC1rZXk6"));
    assert_eq!(requests[0].query.get("limit").map(String::as_str), Some("100"));
    assert_eq!(requests[0].query.get("offset").map(String::as_str), Some("20"));
}

#[tokio::test]
async fn delete_no_content_becomes_success_body() {
    let router = Router::new().route(
        "/people/{id}",
        delete(|Path(_id): Path<String>| async move { StatusCode::NO_CONTENT }),
    );
    let base_url = spawn(router).await;

    let client = client_for(&base_url, 5);
    let result = client.delete_person("42").await.expect("delete");
    assert_eq!(result, json!({"success": true}));
}

#[tokio::test]
async fn api_errors_preserve_status_and_body() {
    let router = Router::new()
        .route(
            "/people/{id}",
            get(|Path(_id): Path<String>| async move {
                (StatusCode::NOT_FOUND, Json(json!({"errorMessage": "no such person"})))
            }),
        )
        .route(
            "/people",
            get(|| async move {
                (StatusCode::TOO_MANY_REQUESTS, Json(json!({"errorMessage": "rate limited"})))
            }),
        );
    let base_url = spawn(router).await;

    let client = client_for(&base_url, 5);

    let err = client.get_person("42").await.expect_err("404 surfaces");
    match &err {
        AdapterError::Api { status, body } => {
            assert_eq!(*status, 404);
            assert_eq!(body["errorMessage"], "no such person");
        }
        other => panic!("expected Api error, got {other:?}"),
    }

    let err = client
        .list_people(PageQuery::default(), &[])
        .await
        .expect_err("429 surfaces");
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn slow_responses_map_to_timeout() {
    let router = Router::new().route(
        "/people",
        get(|| async move {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Json(json!({"people": []}))
        }),
    );
    let base_url = spawn(router).await;

    let client = client_for(&base_url, 1);
    let err = client
        .list_people(PageQuery::default(), &[])
        .await
        .expect_err("timeout surfaces");
    assert_eq!(err, AdapterError::Timeout { seconds: 1 });
}

#[tokio::test]
async fn update_person_body_never_carries_the_identifier() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/people/{id}",
            put(
                |State(recorder): State<Recorder>,
                 Path(id): Path<String>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    recorder.record(&headers, HashMap::new(), body.clone()).await;
                    let mut echoed = body;
                    echoed["id"] = Value::String(id);
                    Json(echoed)
                },
            ),
        )
        .with_state(recorder.clone());
    let base_url = spawn(router).await;

    let mut fields = Map::new();
    fields.insert("id".to_string(), json!("42"));
    fields.insert("personId".to_string(), json!("42"));
    fields.insert("stage".to_string(), json!("Hot Lead"));

    let client = client_for(&base_url, 5);
    client.update_person("42", fields).await.expect("update");

    let requests = recorder.take().await;
    assert_eq!(requests.len(), 1);
    let wire_body = requests[0].body.as_object().expect("json body");
    assert!(!wire_body.contains_key("id"));
    assert!(!wire_body.contains_key("personId"));
    assert_eq!(wire_body.get("stage"), Some(&json!("Hot Lead")));
}

#[tokio::test]
async fn created_person_is_readable_back_with_fields_intact() {
    let store: Arc<Mutex<HashMap<String, Value>>> = Arc::default();
    let router = Router::new()
        .route(
            "/people",
            post({
                let store = Arc::clone(&store);
                move |Json(body): Json<Value>| async move {
                    let mut person = body;
                    person["id"] = json!(7);
                    store.lock().await.insert("7".to_string(), person.clone());
                    (StatusCode::CREATED, Json(person))
                }
            }),
        )
        .route(
            "/people/{id}",
            get({
                let store = Arc::clone(&store);
                move |Path(id): Path<String>| async move {
                    match store.lock().await.get(&id) {
                        Some(person) => (StatusCode::OK, Json(person.clone())),
                        None => (StatusCode::NOT_FOUND, Json(json!({"errorMessage": "not found"}))),
                    }
                }
            }),
        );
    let base_url = spawn(router).await;

    let mut fields = Map::new();
    fields.insert("name".to_string(), json!("Jane Doe"));
    fields.insert("email".to_string(), json!("jane@example.com"));
    fields.insert("phone".to_string(), json!("")); // blank, must not reach the wire

    let client = client_for(&base_url, 5);
    let created = client.create_person(fields).await.expect("create");
    let id = created["id"].to_string();

    let fetched = client.get_person(&id).await.expect("read back");
    assert_eq!(fetched["name"], "Jane Doe");
    assert_eq!(fetched["email"], "jane@example.com");
    assert!(fetched.get("phone").is_none());
}

#[tokio::test]
async fn create_event_is_a_single_call_with_person_intact() {
    let recorder = Recorder::default();
    let router = Router::new()
        .route(
            "/events",
            post(
                |State(recorder): State<Recorder>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    recorder.record(&headers, HashMap::new(), body).await;
                    (StatusCode::CREATED, Json(json!({"id": "ev-1"})))
                },
            ),
        )
        .with_state(recorder.clone());
    let base_url = spawn(router).await;

    let event = match json!({
        "type": "other",
        "source": "ElevenLabs AI Call",
        "person": {"name": "Unknown Caller", "phones": [{"value": "+15551234567"}]},
        "note": "caller asked about listings",
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };

    let client = client_for(&base_url, 5);
    client.create_event(event).await.expect("create event");

    let requests = recorder.take().await;
    assert_eq!(requests.len(), 1, "lead ingestion must not fan out into extra calls");
    let person = &requests[0].body["person"];
    assert_eq!(person["name"], "Unknown Caller");
    assert_eq!(person["phones"][0]["value"], "+15551234567");
}
