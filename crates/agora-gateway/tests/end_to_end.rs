//! Drives a Gateway against the real API router and an in-memory store,
//! in-process.

use agora_api::{AppState, api_router};
use agora_core::{
  Identity,
  post::{CreatePostRequest, Page},
  profile::CreateUserRequest,
  wire::{ROOT_HEADER, RootKey, ServiceIds, StatusReply},
};
use agora_gateway::{
  Agent, Call, Connector, Gateway, GatewayConfig, GatewayError, TransportError,
  transport::{read_reply, rpc_path, seal},
  views,
};
use agora_store_sqlite::SqliteStore;
use axum::{
  Router,
  body::{Body, Bytes},
  http::{Request, header},
};
use serde_json::Value;
use tower::ServiceExt as _;

// ─── Router-backed transport ─────────────────────────────────────────────────

struct RouterConnector {
  app: Router,
}

struct RouterAgent {
  app: Router,
}

impl Connector for RouterConnector {
  type Agent = RouterAgent;

  async fn connect(&self, _host: String) -> Result<RouterAgent, TransportError> {
    Ok(RouterAgent { app: self.app.clone() })
  }
}

impl RouterAgent {
  async fn send(&self, req: Request<Body>) -> Result<(u16, Bytes), TransportError> {
    let resp = self.app.clone().oneshot(req).await.unwrap_or_else(|e| match e {});
    let status = resp.status().as_u16();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .map_err(|e| TransportError::Malformed(e.to_string()))?;
    Ok((status, body))
  }
}

impl Agent for RouterAgent {
  async fn status(&self) -> Result<StatusReply, TransportError> {
    let req = Request::builder()
      .uri("/api/status")
      .body(Body::empty())
      .unwrap();
    let (status, body) = self.send(req).await?;
    serde_json::from_value(read_reply(status, &body)?)
      .map_err(|e| TransportError::Malformed(e.to_string()))
  }

  async fn call(&self, call: Call) -> Result<Value, TransportError> {
    let (body, signature) = seal(&call)?;
    let mut req = Request::builder()
      .method("POST")
      .uri(rpc_path(&call))
      .header(header::CONTENT_TYPE, "application/json")
      .header(ROOT_HEADER, call.root.as_str());
    for (name, value) in signature.iter().flat_map(|s| s.headers()) {
      req = req.header(name, value);
    }
    let (status, body) = self.send(req.body(Body::from(body)).unwrap()).await?;
    read_reply(status, &body)
  }
}

async fn app(root_key: RootKey) -> Router {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let state = AppState::new(store, root_key, ServiceIds::default());
  Router::new().nest("/api", api_router(state))
}

async fn gateway() -> Gateway<RouterConnector> {
  let app = app(RootKey::generate()).await;
  Gateway::new(RouterConnector { app }, GatewayConfig::default())
}

fn form(username: &str) -> CreateUserRequest {
  CreateUserRequest::from_form(username, username, "", "")
}

fn post(content: &str) -> CreatePostRequest {
  CreatePostRequest { content: content.to_string(), media_urls: vec![] }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_caller_gets_business_refusal() {
  let gateway = gateway().await;
  let err = gateway.create_user(form("alice")).await.unwrap_err();
  assert!(matches!(
    err,
    GatewayError::Business(ref r) if r == "Anonymous users cannot create profiles"
  ));
}

#[tokio::test]
async fn follow_twice_is_success() {
  let gateway = gateway().await;
  let alice = Identity::generate();
  let bob = Identity::generate();

  gateway.update_identity(bob.clone()).await.unwrap();
  gateway.follow_user(alice.principal()).await.unwrap();
  assert!(gateway.is_following(bob.principal(), alice.principal()).await.unwrap());
  gateway.follow_user(alice.principal()).await.unwrap();
  assert!(gateway.is_following(bob.principal(), alice.principal()).await.unwrap());

  let stats = gateway.get_social_stats(alice.principal()).await.unwrap();
  assert_eq!(stats.followers_count, 1);
  assert_eq!(gateway.get_followers(alice.principal()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn recent_posts_paginate_without_overlap() {
  let gateway = gateway().await;
  gateway.update_identity(Identity::generate()).await.unwrap();
  for i in 0..35 {
    gateway.create_post(post(&format!("post {i}"))).await.unwrap();
  }

  let first = gateway.get_recent_posts(Page::new(20, 0)).await.unwrap();
  let second = gateway.get_recent_posts(Page::new(20, 0).next()).await.unwrap();
  assert_eq!(first.len(), 20);
  assert_eq!(second.len(), 15);

  let ids: Vec<u64> = first.iter().chain(&second).map(|p| p.id).collect();
  let mut sorted = ids.clone();
  sorted.sort_unstable_by(|a, b| b.cmp(a));
  sorted.dedup();
  assert_eq!(ids, sorted, "pages overlap or are out of order");
}

#[tokio::test]
async fn session_flow_across_identities() {
  let gateway = gateway().await;
  let alice = Identity::generate();
  let bob = Identity::generate();

  gateway.update_identity(alice.clone()).await.unwrap();
  views::register(&gateway, form("alice")).await.unwrap();
  let hello = gateway.create_post(post("hello")).await.unwrap();

  gateway.update_identity(bob.clone()).await.unwrap();
  let err = views::register(&gateway, form("alice")).await.unwrap_err();
  assert_eq!(err.user_message(), "Username already taken");
  assert!(views::current_profile(&gateway).await.unwrap().is_none());

  gateway.follow_user(alice.principal()).await.unwrap();
  let liked = views::toggle_like(&gateway, &hello, bob.principal()).await.unwrap();
  assert_eq!(liked.like_count, 1);
  assert!(liked.like_count_consistent());
  let unliked = views::toggle_like(&gateway, &liked, bob.principal()).await.unwrap();
  assert_eq!(unliked.displayed_like_count(), 0);

  // Only the author may delete.
  let err = gateway.delete_post(hello.id).await.unwrap_err();
  assert!(err.is_business());

  let feed = views::following_feed(&gateway, bob.principal(), Page::default())
    .await
    .unwrap();
  let feed = views::hydrate_feed(&gateway, feed).await.unwrap();
  assert_eq!(feed.len(), 1);
  assert_eq!(feed[0].author.handle(), "@alice");

  let page = views::profile_page(&gateway, "alice", bob.principal())
    .await
    .unwrap();
  assert_eq!(page.posts.len(), 1);
  assert_eq!(page.stats.followers_count, 1);
  assert_eq!(page.is_following, Some(true));

  gateway.clear_identity().await.unwrap();
  let err = gateway.follow_user(alice.principal()).await.unwrap_err();
  assert!(err.is_business());
}

#[tokio::test]
async fn untrusted_root_is_a_transport_failure() {
  let app = app(RootKey::generate()).await;
  let wrong = RootKey::generate();
  let gateway = Gateway::new(
    RouterConnector { app },
    GatewayConfig::production(wrong.to_hex()),
  );

  let err = gateway.get_all_users().await.unwrap_err();
  assert!(matches!(
    err,
    GatewayError::Transport(TransportError::Rejected { status: 401, .. })
  ));
  assert!(!err.is_business());
}
