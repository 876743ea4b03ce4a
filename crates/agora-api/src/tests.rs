use agora_core::{
  Identity,
  signature::{CallSignature, SENDER_HEADER},
  wire::{Method, ROOT_HEADER, RootKey, ServiceIds, StatusReply},
};
use agora_store_sqlite::SqliteStore;
use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{AppState, api_router};

async fn make_state() -> AppState<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  AppState::new(store, RootKey::generate(), ServiceIds::default())
}

fn app(state: &AppState<SqliteStore>) -> Router {
  Router::new().nest("/api", api_router(state.clone()))
}

fn signed_request(
  state: &AppState<SqliteStore>,
  signature: Option<&CallSignature>,
  service_id: &str,
  method: &str,
  body: String,
) -> Request<Body> {
  let mut builder = Request::builder()
    .method("POST")
    .uri(format!("/api/rpc/{service_id}/{method}"))
    .header(header::CONTENT_TYPE, "application/json")
    .header(ROOT_HEADER, state.root_key.fingerprint());
  for (name, value) in signature.map(CallSignature::headers).into_iter().flatten() {
    builder = builder.header(name, value);
  }
  builder.body(Body::from(body)).unwrap()
}

fn rpc_request(
  state: &AppState<SqliteStore>,
  caller: Option<&Identity>,
  service_id: &str,
  method: &str,
  args: Value,
) -> Request<Body> {
  let body = args.to_string();
  let signature = match (caller, method.parse::<Method>()) {
    (Some(identity), Ok(m)) => CallSignature::sign(identity, service_id, m, body.as_bytes()),
    _ => None,
  };
  signed_request(state, signature.as_ref(), service_id, method, body)
}

async fn send(state: &AppState<SqliteStore>, req: Request<Body>) -> (StatusCode, Value) {
  let resp = app(state).oneshot(req).await.unwrap();
  let status = resp.status();
  (status, body_json(resp).await)
}

async fn body_json(resp: axum::response::Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
    .await
    .unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

async fn call(
  state: &AppState<SqliteStore>,
  caller: Option<&Identity>,
  service_id: &str,
  method: &str,
  args: Value,
) -> (StatusCode, Value) {
  send(state, rpc_request(state, caller, service_id, method, args)).await
}

fn user_form(username: &str) -> Value {
  json!({
    "username": username,
    "display_name": "Alice",
    "bio": "",
    "avatar_url": "https://example.com/a.png",
  })
}

#[tokio::test]
async fn status_publishes_root_key() {
  let state = make_state().await;
  let req = Request::builder()
    .uri("/api/status")
    .body(Body::empty())
    .unwrap();
  let resp = app(&state).oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::OK);
  let reply: StatusReply = serde_json::from_value(body_json(resp).await).unwrap();
  assert_eq!(RootKey::from_hex(&reply.root_key).as_ref(), Some(&*state.root_key));
}

#[tokio::test]
async fn untrusted_root_is_unauthorized() {
  let state = make_state().await;
  let ids = ServiceIds::default();
  let req = Request::builder()
    .method("POST")
    .uri(format!("/api/rpc/{}/get_all_users", ids.user_directory))
    .header(header::CONTENT_TYPE, "application/json")
    .header(ROOT_HEADER, RootKey::generate().fingerprint())
    .body(Body::from("[]"))
    .unwrap();
  let resp = app(&state).oneshot(req).await.unwrap();
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_then_fetch_user() {
  let state = make_state().await;
  let ids = ServiceIds::default();
  let alice = Identity::generate();

  let (status, body) = call(
    &state,
    Some(&alice),
    &ids.user_directory,
    "create_user",
    json!([user_form("alice")]),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["Ok"]["username"], "alice");
  assert_eq!(body["Ok"]["principal"], alice.principal().as_str());

  let (_, body) = call(
    &state,
    Some(&alice),
    &ids.user_directory,
    "get_current_user",
    json!([]),
  )
  .await;
  assert_eq!(body["Ok"]["username"], "alice");

  let (_, body) = call(
    &state,
    None,
    &ids.user_directory,
    "username_available",
    json!(["alice"]),
  )
  .await;
  assert_eq!(body, json!(false));

  // Exact match: usernames are stored lowercase, so this one is unclaimed.
  let (_, body) = call(
    &state,
    None,
    &ids.user_directory,
    "username_available",
    json!(["ALICE"]),
  )
  .await;
  assert_eq!(body, json!(true));
}

#[tokio::test]
async fn refusals_travel_in_the_envelope() {
  let state = make_state().await;
  let ids = ServiceIds::default();

  let (status, body) =
    call(&state, None, &ids.user_directory, "create_user", json!([user_form("anon")]))
      .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "Err": "Anonymous users cannot create profiles" }));

  let (status, body) =
    call(&state, None, &ids.post_store, "get_post", json!([42])).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "Err": "Post not found" }));
}

#[tokio::test]
async fn posts_and_graph_round_trip() {
  let state = make_state().await;
  let ids = ServiceIds::default();
  let alice = Identity::generate();
  let bob = Identity::generate();

  let (_, body) = call(
    &state,
    Some(&alice),
    &ids.post_store,
    "create_post",
    json!([{ "content": "hello", "media_urls": [] }]),
  )
  .await;
  let id = body["Ok"]["id"].as_u64().unwrap();

  let (_, body) =
    call(&state, Some(&bob), &ids.post_store, "like_post", json!([id]))
      .await;
  assert_eq!(body["Ok"]["like_count"], 1);

  let (_, body) = call(
    &state,
    None,
    &ids.post_store,
    "get_posts_by_users",
    json!([[alice.principal()], 20, 0]),
  )
  .await;
  assert_eq!(body.as_array().unwrap().len(), 1);

  let (_, body) = call(
    &state,
    Some(&bob),
    &ids.social_graph,
    "follow_user",
    json!([alice.principal()]),
  )
  .await;
  assert_eq!(body, json!({ "Ok": null }));

  let (_, body) = call(
    &state,
    None,
    &ids.social_graph,
    "is_following",
    json!([bob.principal(), alice.principal()]),
  )
  .await;
  assert_eq!(body, json!(true));

  let (_, body) = call(
    &state,
    None,
    &ids.social_graph,
    "get_social_stats",
    json!([alice.principal()]),
  )
  .await;
  assert_eq!(body["followers_count"], 1);
  assert_eq!(body["following_count"], 0);
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
  let state = make_state().await;
  let ids = ServiceIds::default();

  let (status, _) = call(&state, None, "aaaaa-aa", "get_all_users", json!([])).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  // Method exists, but on another service.
  let (status, _) = call(&state, None, &ids.post_store, "get_all_users", json!([])).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_arguments_are_bad_request() {
  let state = make_state().await;
  let ids = ServiceIds::default();
  let (status, body) =
    call(&state, None, &ids.post_store, "get_post", json!(["not-a-number"])).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("invalid arguments"));
}

#[tokio::test]
async fn claimed_principal_without_signature_is_anonymous() {
  let state = make_state().await;
  let ids = ServiceIds::default();
  let victim = Identity::generate();

  let req = Request::builder()
    .method("POST")
    .uri(format!("/api/rpc/{}/create_post", ids.post_store))
    .header(header::CONTENT_TYPE, "application/json")
    .header(ROOT_HEADER, state.root_key.fingerprint())
    .header("x-agora-principal", victim.principal().as_str())
    .body(Body::from(r#"[{"content":"forged","media_urls":[]}]"#))
    .unwrap();
  let (status, body) = send(&state, req).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "Err": "Anonymous users cannot create posts" }));
}

#[tokio::test]
async fn signature_from_another_key_is_unauthorized() {
  let state = make_state().await;
  let ids = ServiceIds::default();
  let victim = Identity::generate();
  let mallory = Identity::generate();

  let body = r#"[{"content":"forged","media_urls":[]}]"#.to_string();
  let mut signature =
    CallSignature::sign(&mallory, &ids.post_store, Method::CreatePost, body.as_bytes())
      .unwrap();
  signature.sender = hex_public_key(&victim);
  let req = signed_request(&state, Some(&signature), &ids.post_store, "create_post", body);
  let (status, _) = send(&state, req).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tampered_body_is_unauthorized() {
  let state = make_state().await;
  let ids = ServiceIds::default();
  let alice = Identity::generate();

  let signed = r#"[{"content":"hello","media_urls":[]}]"#;
  let signature =
    CallSignature::sign(&alice, &ids.post_store, Method::CreatePost, signed.as_bytes())
      .unwrap();
  let req = signed_request(
    &state,
    Some(&signature),
    &ids.post_store,
    "create_post",
    r#"[{"content":"goodbye","media_urls":[]}]"#.to_string(),
  );
  let (status, _) = send(&state, req).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn replayed_call_is_unauthorized() {
  let state = make_state().await;
  let ids = ServiceIds::default();
  let alice = Identity::generate();

  let body = r#"[{"content":"once","media_urls":[]}]"#.to_string();
  let signature =
    CallSignature::sign(&alice, &ids.post_store, Method::CreatePost, body.as_bytes())
      .unwrap();
  let first =
    signed_request(&state, Some(&signature), &ids.post_store, "create_post", body.clone());
  let (status, reply) = send(&state, first).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(reply["Ok"]["author"], alice.principal().as_str());

  let again = signed_request(&state, Some(&signature), &ids.post_store, "create_post", body);
  let (status, _) = send(&state, again).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn partial_signature_headers_are_unauthorized() {
  let state = make_state().await;
  let ids = ServiceIds::default();
  let req = Request::builder()
    .method("POST")
    .uri(format!("/api/rpc/{}/get_current_user", ids.user_directory))
    .header(header::CONTENT_TYPE, "application/json")
    .header(ROOT_HEADER, state.root_key.fingerprint())
    .header(SENDER_HEADER, hex_public_key(&Identity::generate()))
    .body(Body::from("[]"))
    .unwrap();
  let (status, _) = send(&state, req).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
}

fn hex_public_key(identity: &Identity) -> String {
  identity
    .public_key()
    .unwrap()
    .as_bytes()
    .iter()
    .map(|b| format!("{b:02x}"))
    .collect()
}
