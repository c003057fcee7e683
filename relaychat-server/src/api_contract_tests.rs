//! Black-box tests of the REST boundary: exact status codes and bodies.

use std::sync::Arc;

use axum_test::TestServer;
use chrono::{TimeZone, Utc};
use cookie::Cookie;
use relaychat_shared::config::Config;
use relaychat_shared::models::{Message, Timestamp, UserProfile};
use serde_json::json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::server::create_app_router;
use crate::services::store::UserAccount;

const SESSION_TOKEN: &str = "valid-session-token";

fn test_server(state: Arc<AppState>) -> TestServer {
    let router = create_app_router(state, &Config::default());
    TestServer::new(router).unwrap()
}

fn session_cookie() -> Cookie<'static> {
    Cookie::new("session", SESSION_TOKEN)
}

fn account(username: &str, email: &str, name: &str) -> UserAccount {
    UserAccount {
        profile: UserProfile {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            name: name.to_string(),
            profile_picture: format!("/avatars/{username}.png"),
        },
        email: email.to_string(),
    }
}

/// A state with one logged-in user behind [`SESSION_TOKEN`].
fn seeded_state() -> (Arc<AppState>, Uuid) {
    let state = Arc::new(AppState::default());
    let me = account("me", "me@example.com", "Me");
    let user_id = me.profile.user_id;
    state.store.insert_user(me);
    state.store.insert_session(SESSION_TOKEN, user_id);
    (state, user_id)
}

fn message_at(conversation_id: Uuid, sender_id: Uuid, seconds: i64, content: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id,
        content: content.to_string(),
        created_at: Timestamp(
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
                + chrono::Duration::seconds(seconds),
        ),
    }
}

#[tokio::test]
async fn missing_session_yields_the_fixed_forbidden_body() {
    let (state, _) = seeded_state();
    let server = test_server(state);

    let response = server
        .get(&format!("/api/messages/{}", Uuid::new_v4()))
        .await;

    response.assert_status_unauthorized();
    assert_eq!(
        response.json::<serde_json::Value>(),
        json!({ "message": "Forbidden", "status": 401 })
    );
}

#[tokio::test]
async fn unknown_session_token_is_unauthorized() {
    let (state, _) = seeded_state();
    let server = test_server(state);

    let response = server
        .get("/api/search-user")
        .add_cookie(Cookie::new("session", "stale-token"))
        .await;

    response.assert_status_unauthorized();
    assert_eq!(response.json::<serde_json::Value>()["message"], "Forbidden");
}

#[tokio::test]
async fn session_for_a_deleted_user_yields_user_not_found() {
    let state = Arc::new(AppState::default());
    // The session survives but the user record is gone.
    state.store.insert_session(SESSION_TOKEN, Uuid::new_v4());
    let server = test_server(state);

    let response = server
        .get(&format!("/api/messages/{}", Uuid::new_v4()))
        .add_cookie(session_cookie())
        .await;

    response.assert_status_not_found();
    assert_eq!(
        response.json::<serde_json::Value>(),
        json!({ "message": "User not found", "status": 404 })
    );
}

#[tokio::test]
async fn short_or_missing_search_query_is_not_acceptable() {
    let (state, _) = seeded_state();
    let server = test_server(state);

    for query in [None, Some("a"), Some("abc")] {
        let mut request = server.get("/api/search-user").add_cookie(session_cookie());
        if let Some(query) = query {
            request = request.add_query_param("query", query);
        }
        let response = request.await;

        response.assert_status(axum::http::StatusCode::NOT_ACCEPTABLE);
        assert_eq!(
            response.json::<serde_json::Value>(),
            json!({ "message": "Query parameter too short or missing.", "status": 406 })
        );
    }
}

#[tokio::test]
async fn search_results_use_the_query_result_envelope() {
    let (state, _) = seeded_state();
    state.store.insert_user(account("alice", "alice@example.com", "Alice"));
    state.store.insert_user(account("malice", "mallory@example.com", "Mallory"));
    state.store.insert_user(account("bob", "bob@example.com", "Bob"));
    let server = test_server(state);

    let response = server
        .get("/api/search-user")
        .add_cookie(session_cookie())
        .add_query_param("query", "alice")
        .await;

    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    let rows = body["queryResult"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    // The wire spells the id field `userID` in search results.
    assert!(rows[0].get("userID").is_some());
    assert!(rows[0].get("userId").is_none());
}

#[tokio::test]
async fn search_honors_skip_and_take() {
    let (state, _) = seeded_state();
    for username in ["carol", "caroline", "carolyn"] {
        state
            .store
            .insert_user(account(username, "c@example.com", username));
    }
    let server = test_server(state);

    let response = server
        .get("/api/search-user")
        .add_cookie(session_cookie())
        .add_query_param("query", "carol")
        .add_query_param("skip", 1)
        .add_query_param("take", 1)
        .await;

    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    let rows = body["queryResult"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["username"], "caroline");
}

#[tokio::test]
async fn message_page_is_newest_first_with_default_size() {
    let (state, user_id) = seeded_state();
    let conversation = Uuid::new_v4();
    for seconds in 0..12 {
        state
            .store
            .insert_message(message_at(conversation, user_id, seconds, &format!("m{seconds}")));
    }
    let server = test_server(state);

    let response = server
        .get(&format!("/api/messages/{conversation}"))
        .add_cookie(session_cookie())
        .await;

    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 10);
    assert_eq!(messages[0]["content"], "m11");
    assert_eq!(messages[9]["content"], "m2");
    // camelCase row shape with an embedded sender profile.
    assert!(messages[0].get("createdAt").is_some());
    assert_eq!(messages[0]["sender"]["username"], "me");
}

#[tokio::test]
async fn message_page_skip_walks_back_in_time() {
    let (state, user_id) = seeded_state();
    let conversation = Uuid::new_v4();
    for seconds in 0..12 {
        state
            .store
            .insert_message(message_at(conversation, user_id, seconds, &format!("m{seconds}")));
    }
    let server = test_server(state);

    let response = server
        .get(&format!("/api/messages/{conversation}"))
        .add_cookie(session_cookie())
        .add_query_param("skip", 10)
        .await;

    response.assert_status_ok();
    let body = response.json::<serde_json::Value>();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "m1");
    assert_eq!(messages[1]["content"], "m0");
}

#[tokio::test]
async fn unknown_conversation_reads_as_an_empty_page() {
    let (state, _) = seeded_state();
    let server = test_server(state);

    let response = server
        .get(&format!("/api/messages/{}", Uuid::new_v4()))
        .add_cookie(session_cookie())
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<serde_json::Value>(),
        json!({ "messages": [] })
    );
}
