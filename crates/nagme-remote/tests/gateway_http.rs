//! Gateway behavior against a mocked backend.
//!
//! The gateway is blocking, so every call runs on the blocking pool while
//! the mock server keeps serving on the runtime.

use std::sync::Arc;

use nagme_core::config::{AccessMode, GatewayConfig};
use nagme_core::event::{EventData, NagEvent, NagPatch, PushData};
use nagme_core::model::NagId;
use nagme_core::source::{Gateway, Session, StateSource, commit_event, load_current_state};
use nagme_core::NagError;
use nagme_remote::SupabaseGateway;
use serde_json::{Value, json};
use wiremock::matchers::{any, body_string_contains, header, method, path, query_param, query_param_contains};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn gateway(server: &MockServer) -> Arc<SupabaseGateway> {
    let config = GatewayConfig {
        endpoint: format!("{}/", server.uri()),
        api_key: "anon-key".into(),
        mode: AccessMode::ReadWrite,
        ..GatewayConfig::default()
    };
    Arc::new(SupabaseGateway::new(&config, 0).expect("gateway"))
}

fn session() -> Session {
    Session {
        access_token: "tok".into(),
        user_id: "u1".into(),
    }
}

/// Run a blocking gateway call off the runtime threads.
async fn blocking<T, F>(call: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(call).await.expect("gateway call panicked")
}

fn event_row(id: u64, created_at: &str, payload: &Value) -> Value {
    json!({"id": id, "created_at": created_at, "user_id": "u1", "payload": payload})
}

fn header_of<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

async fn requests(server: &MockServer) -> Vec<Request> {
    server.received_requests().await.expect("recording enabled")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sign_in_returns_session_and_sends_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(body_string_contains("right"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok", "user": {"id": "u1"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error_description": "Invalid login credentials"})),
        )
        .with_priority(10)
        .mount(&server)
        .await;
    let gw = gateway(&server);

    let signed_in = Arc::clone(&gw);
    let session = blocking(move || signed_in.authenticate(" me@example.com ", "right"))
        .await
        .expect("signed in");
    assert_eq!(session.user_id, "u1");

    let rejected = Arc::clone(&gw);
    let err = blocking(move || rejected.authenticate("me@example.com", "wrong"))
        .await
        .expect_err("rejected");
    assert!(matches!(err, NagError::Auth(ref m) if m.contains("Invalid login credentials")));

    let seen = requests(&server).await;
    assert_eq!(header_of(&seen[0], "apikey"), Some("anon-key"));
    assert!(String::from_utf8_lossy(&seen[0].body).contains("\"me@example.com\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_direct_table_falls_back_to_replayed_events() {
    let rows = json!([
        event_row(
            1,
            "2025-01-01T00:00:00Z",
            &json!({"action": "create", "workName": "rent", "nagText": "Pay rent", "oneTimeEpochMillis": 100}),
        ),
        event_row(
            2,
            "2025-01-02T00:00:00Z",
            &json!({"action": "update", "workName": "rent", "nagText": "Pay rent", "oneTimeEpochMillis": 200}),
        ),
        event_row(
            3,
            "2025-01-03T00:00:00Z",
            &json!({"action": "create", "workName": "gone", "nagText": "Gone"}),
        ),
        event_row(
            4,
            "2025-01-04T00:00:00Z",
            &json!({"action": "delete", "workName": "gone", "nagText": "Gone"}),
        ),
    ]);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/nag_state"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"message": "relation \"public.nag_state\" does not exist"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/nag"))
        .and(query_param_contains("select", "event_id"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "column nag.event_id does not exist"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/nag"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .with_priority(10)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"message": "Could not find the table 'public.events'"})),
        )
        .mount(&server)
        .await;
    let gw = gateway(&server);

    let loader = Arc::clone(&gw);
    let state = blocking(move || load_current_state(loader.as_ref(), &session()))
        .await
        .expect("state");
    assert_eq!(state.source, StateSource::Events { events: 4 });
    assert_eq!(state.nags.len(), 1);
    let rent = &state.nags[&NagId::new("rent").expect("id")];
    assert_eq!(rent.title, "Pay rent");
    assert_eq!(rent.due_ms, Some(200));
    assert_eq!(gw.active_table().as_deref(), Some("nag"));

    let nag_reads = requests(&server)
        .await
        .into_iter()
        .filter(|r| r.url.path() == "/rest/v1/nag")
        .count();
    assert_eq!(nag_reads, 2, "extended select retried with core columns");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_event_table_at_all_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({})))
        .mount(&server)
        .await;
    let gw = gateway(&server);

    let events = Arc::clone(&gw);
    let fetched = blocking(move || events.fetch_events(&session())).await;
    assert!(matches!(fetched, Err(NagError::NotFound(_))));

    let loaded = blocking(move || load_current_state(gw.as_ref(), &session())).await;
    assert!(matches!(loaded, Err(NagError::NotFound(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn writes_post_encoded_rows_and_surface_policy_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/nag"))
        .and(body_string_contains("\"push\""))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"message": "new row violates row-level security policy"})),
        )
        .with_priority(10)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/nag_state"))
        .and(query_param("id", "eq.rent"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let gw = gateway(&server);
    let id = NagId::new("rent").expect("id");

    let (writer, rent) = (Arc::clone(&gw), id.clone());
    let result = blocking(move || {
        let push = NagEvent::new("e1", rent.clone(), 10, EventData::Push(PushData::new(3_600_000)));
        writer.write_event(&session(), &push)?;
        let update = NagEvent::new("e2", rent.clone(), 20, EventData::Update(NagPatch::default()));
        let refused = writer.write_event(&session(), &update);
        writer.delete_entity(&session(), &rent)?;
        Ok::<_, NagError>(refused)
    })
    .await
    .expect("push and delete succeed");
    assert!(matches!(result, Err(NagError::Permission(_))));

    let seen = requests(&server).await;
    let first: Value = serde_json::from_slice(&seen[0].body).expect("json body");
    assert_eq!(first["user_id"], "u1");
    assert_eq!(first["payload"]["workName"], "rent");
    assert_eq!(first["payload"]["pushByMillis"], 3_600_000);
    assert_eq!(header_of(&seen[0], "prefer"), Some("return=minimal"));
    assert_eq!(seen[2].method.to_string(), "DELETE");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn edits_reach_a_populated_direct_table() {
    let direct_row = json!({
        "id": "rent",
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z",
        "payload": {"workName": "rent", "nagText": "Pay rent", "weight": 50}
    });

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/nag_state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([direct_row])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/nag"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/nag_state"))
        .and(query_param("on_conflict", "id"))
        .and(header("prefer", "resolution=merge-duplicates,return=minimal"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    let gw = gateway(&server);
    let id = NagId::new("rent").expect("id");

    let (editor, rent) = (Arc::clone(&gw), id.clone());
    let after = blocking(move || {
        let state = load_current_state(editor.as_ref(), &session())?;
        assert!(matches!(state.source, StateSource::Direct { rows: 1 }));
        let edit = NagEvent::new(
            "e1",
            rent.clone(),
            1_800_000_000_000,
            EventData::Update(NagPatch {
                weight: Some(90),
                ..NagPatch::default()
            }),
        );
        commit_event(editor.as_ref(), &session(), &edit, state.nags.get(&rent).cloned(), state.source)
    })
    .await
    .expect("commit")
    .expect("still live");
    assert_eq!(after.weight, 90);

    let upsert = requests(&server)
        .await
        .into_iter()
        .find(|r| r.method.to_string() == "POST" && r.url.path() == "/rest/v1/nag_state")
        .expect("direct row upserted");
    let written: Value = serde_json::from_slice(&upsert.body).expect("json body");
    assert_eq!(written["id"], "rent");
    assert_eq!(written["payload"]["weight"], 90);

    // Serve what was written; the next load sees the edit.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/nag_state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([written])))
        .mount(&server)
        .await;
    let reloaded = blocking(move || load_current_state(gw.as_ref(), &session()))
        .await
        .expect("reload");
    assert_eq!(reloaded.nags[&id].weight, 90);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn password_change_puts_the_new_password() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer tok"))
        .and(body_string_contains("correct-horse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/auth/v1/user"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(json!({"msg": "weak", "error_description": "Password is too weak"})),
        )
        .with_priority(10)
        .mount(&server)
        .await;
    let gw = gateway(&server);

    let accepted = Arc::clone(&gw);
    blocking(move || accepted.change_password(&session(), "correct-horse"))
        .await
        .expect("changed");

    let err = blocking(move || gw.change_password(&session(), "12345678"))
        .await
        .expect_err("too weak");
    assert!(matches!(err, NagError::Auth(ref m) if m.contains("too weak")));
}
