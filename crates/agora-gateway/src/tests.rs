use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use agora_core::{
  Identity, Principal,
  post::{Page, Post},
  profile::CreateUserRequest,
  wire::{Method, RootKey, StatusReply},
};
use serde_json::{Value, json};
use strum::IntoEnumIterator;
use tokio::sync::Notify;

use crate::{
  Agent, AuthError, Call, Connector, Gateway, GatewayConfig, GatewayError, GatewayResult,
  State, TransportError,
  auth::{AuthClient, AuthContext},
  views,
};

// ─── Fake transport ──────────────────────────────────────────────────────────

type Responder = Box<dyn Fn(&Call) -> Result<Value, TransportError> + Send + Sync>;

/// Holds calls to one method until released.
struct Gate {
  method:  Method,
  entered: Notify,
  release: Notify,
}

struct Shared {
  root:               RootKey,
  responder:          Responder,
  gate:               Option<Gate>,
  stall_connects:     AtomicBool,
  connects:           AtomicUsize,
  handshakes:         AtomicUsize,
  failing_handshakes: AtomicUsize,
  calls:              Mutex<Vec<Call>>,
}

#[derive(Clone)]
struct FakeConnector {
  shared: Arc<Shared>,
}

impl FakeConnector {
  fn new(
    responder: impl Fn(&Call) -> Result<Value, TransportError> + Send + Sync + 'static,
  ) -> Self {
    Self::build(Box::new(responder), None)
  }

  fn gated(
    method: Method,
    responder: impl Fn(&Call) -> Result<Value, TransportError> + Send + Sync + 'static,
  ) -> Self {
    let gate = Gate { method, entered: Notify::new(), release: Notify::new() };
    Self::build(Box::new(responder), Some(gate))
  }

  fn build(responder: Responder, gate: Option<Gate>) -> Self {
    Self {
      shared: Arc::new(Shared {
        root: RootKey::generate(),
        responder,
        gate,
        stall_connects: AtomicBool::new(false),
        connects: AtomicUsize::new(0),
        handshakes: AtomicUsize::new(0),
        failing_handshakes: AtomicUsize::new(0),
        calls: Mutex::new(Vec::new()),
      }),
    }
  }

  fn gateway(&self) -> Gateway<FakeConnector> {
    Gateway::new(self.clone(), GatewayConfig::default())
  }

  /// Make `connect` hang until the caller gives up.
  fn stall_connects(&self, stall: bool) {
    self.shared.stall_connects.store(stall, Ordering::SeqCst);
  }

  fn fail_next_handshakes(&self, n: usize) {
    self.shared.failing_handshakes.store(n, Ordering::SeqCst);
  }

  fn gate(&self) -> &Gate { self.shared.gate.as_ref().unwrap() }

  fn connects(&self) -> usize { self.shared.connects.load(Ordering::SeqCst) }

  fn handshakes(&self) -> usize { self.shared.handshakes.load(Ordering::SeqCst) }

  fn calls(&self) -> Vec<Call> { self.shared.calls.lock().unwrap().clone() }

  fn methods(&self) -> Vec<Method> {
    self.calls().into_iter().map(|c| c.method).collect()
  }
}

struct FakeAgent {
  shared: Arc<Shared>,
}

impl Connector for FakeConnector {
  type Agent = FakeAgent;

  async fn connect(&self, _host: String) -> Result<FakeAgent, TransportError> {
    self.shared.connects.fetch_add(1, Ordering::SeqCst);
    if self.shared.stall_connects.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    Ok(FakeAgent { shared: Arc::clone(&self.shared) })
  }
}

impl Agent for FakeAgent {
  async fn status(&self) -> Result<StatusReply, TransportError> {
    self.shared.handshakes.fetch_add(1, Ordering::SeqCst);
    let failing = &self.shared.failing_handshakes;
    if failing.load(Ordering::SeqCst) > 0 {
      failing.fetch_sub(1, Ordering::SeqCst);
      return Err(TransportError::Rejected {
        status:  503,
        message: "replica unavailable".into(),
      });
    }
    Ok(StatusReply { root_key: self.shared.root.to_hex(), version: "test".into() })
  }

  async fn call(&self, call: Call) -> Result<Value, TransportError> {
    self.shared.calls.lock().unwrap().push(call.clone());
    if let Some(gate) = &self.shared.gate
      && gate.method == call.method
    {
      gate.entered.notify_one();
      gate.release.notified().await;
    }
    (self.shared.responder)(&call)
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn empty_list(_: &Call) -> Result<Value, TransportError> { Ok(json!([])) }

fn refuse(_: &Call) -> Result<Value, TransportError> {
  Ok(json!({ "Err": "nope" }))
}

fn fault(_: &Call) -> Result<Value, TransportError> {
  Err(TransportError::Rejected { status: 500, message: "store fault".into() })
}

fn principal() -> Principal { Identity::generate().principal().clone() }

fn post(id: u64, author: &Principal, likes: Vec<Principal>) -> Post {
  let now = "2024-01-01T00:00:00Z".parse().unwrap();
  Post {
    id,
    author: author.clone(),
    content: format!("post {id}"),
    media_urls: vec![],
    like_count: likes.len() as u64,
    likes,
    created_at: now,
    updated_at: now,
  }
}

/// Invoke the Gateway operation behind `method` with placeholder arguments.
async fn invoke(gateway: &Gateway<FakeConnector>, method: Method) -> GatewayResult<()> {
  let p = principal();
  let page = Page::default();
  match method {
    Method::CreateUser => gateway
      .create_user(CreateUserRequest::from_form("alice", "Alice", "", ""))
      .await
      .map(drop),
    Method::GetUser => gateway.get_user(&p).await.map(drop),
    Method::GetUserByUsername => gateway.get_user_by_username("alice").await.map(drop),
    Method::GetCurrentUser => gateway.get_current_user().await.map(drop),
    Method::UpdateUser => gateway.update_user(Default::default()).await.map(drop),
    Method::UsernameAvailable => gateway.is_username_available("alice").await.map(drop),
    Method::GetAllUsers => gateway.get_all_users().await.map(drop),
    Method::CreatePost => gateway
      .create_post(agora_core::post::CreatePostRequest {
        content:    "hi".into(),
        media_urls: vec![],
      })
      .await
      .map(drop),
    Method::GetPost => gateway.get_post(1).await.map(drop),
    Method::UpdatePost => gateway.update_post(1, Default::default()).await.map(drop),
    Method::DeletePost => gateway.delete_post(1).await,
    Method::LikePost => gateway.like_post(1).await.map(drop),
    Method::UnlikePost => gateway.unlike_post(1).await.map(drop),
    Method::GetRecentPosts => gateway.get_recent_posts(page).await.map(drop),
    Method::GetPostsByUsers => {
      gateway.get_posts_by_users(&[p], page).await.map(drop)
    }
    Method::GetUserPosts => gateway.get_user_posts(&p).await.map(drop),
    Method::FollowUser => gateway.follow_user(&p).await,
    Method::UnfollowUser => gateway.unfollow_user(&p).await,
    Method::IsFollowing => gateway.is_following(&p, &p).await.map(drop),
    Method::GetFollowers => gateway.get_followers(&p).await.map(drop),
    Method::GetFollowing => gateway.get_following(&p).await.map(drop),
    Method::GetMutualFollowers => gateway.get_mutual_followers(&p, &p).await.map(drop),
    Method::GetSocialStats => gateway.get_social_stats(&p).await.map(drop),
    Method::GetFollowSuggestions => {
      gateway.get_follow_suggestions(&p, 5).await.map(drop)
    }
  }
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_call_bootstraps_transparently() {
  let fake = FakeConnector::new(empty_list);
  let gateway = fake.gateway();
  assert_eq!(gateway.state().await, State::Uninitialized);

  assert!(gateway.get_all_users().await.unwrap().is_empty());

  assert_eq!(gateway.state().await, State::Ready);
  assert_eq!(fake.connects(), 1);
  assert_eq!(fake.handshakes(), 1);
  let calls = fake.calls();
  assert_eq!(calls.len(), 1);
  assert!(calls[0].caller().is_anonymous());
  assert_eq!(calls[0].root, fake.shared.root.fingerprint());
  assert_eq!(calls[0].endpoint, gateway.config().services.user_directory);
}

#[tokio::test]
async fn concurrent_first_calls_bootstrap_once() {
  let fake = FakeConnector::new(empty_list);
  let gateway = fake.gateway();

  let anon = Principal::anonymous();
  let (a, b, c, d) = tokio::join!(
    gateway.get_all_users(),
    gateway.get_followers(&anon),
    gateway.get_recent_posts(Page::default()),
    gateway.get_following(&anon),
  );
  a.unwrap();
  b.unwrap();
  c.unwrap();
  d.unwrap();

  assert_eq!(fake.connects(), 1);
  assert_eq!(fake.handshakes(), 1);
  assert_eq!(fake.calls().len(), 4);
}

#[tokio::test]
async fn same_identity_twice_is_idempotent() {
  let fake = FakeConnector::new(empty_list);
  let gateway = fake.gateway();
  let alice = Identity::generate();

  gateway.update_identity(alice.clone()).await.unwrap();
  gateway.update_identity(alice.clone()).await.unwrap();
  gateway.get_all_users().await.unwrap();

  assert_eq!(fake.connects(), 1);
  assert_eq!(fake.handshakes(), 1);
  assert_eq!(gateway.principal().await, *alice.principal());
  assert_eq!(*fake.calls()[0].caller(), *alice.principal());
}

#[tokio::test]
async fn pending_call_keeps_its_identity() {
  let fake = FakeConnector::gated(Method::GetAllUsers, |call| match call.method {
    Method::GetAllUsers => Ok(json!([])),
    _ => Ok(json!({ "Err": "User not found" })),
  });
  let gateway = Arc::new(fake.gateway());
  let alice = Identity::generate();
  let bob = Identity::generate();

  gateway.update_identity(alice.clone()).await.unwrap();
  let pending = tokio::spawn({
    let gateway = Arc::clone(&gateway);
    async move { gateway.get_all_users().await }
  });
  fake.gate().entered.notified().await;

  gateway.update_identity(bob.clone()).await.unwrap();
  let err = gateway.get_current_user().await.unwrap_err();
  assert!(err.is_business());

  fake.gate().release.notify_one();
  assert!(pending.await.unwrap().unwrap().is_empty());

  let calls = fake.calls();
  assert_eq!(calls[0].method, Method::GetAllUsers);
  assert_eq!(*calls[0].caller(), *alice.principal());
  assert_eq!(calls[1].method, Method::GetCurrentUser);
  assert_eq!(*calls[1].caller(), *bob.principal());
  assert_eq!(fake.connects(), 1);
}

#[tokio::test]
async fn logout_rebinds_to_anonymous() {
  let fake = FakeConnector::new(empty_list);
  let gateway = fake.gateway();

  gateway.update_identity(Identity::generate()).await.unwrap();
  gateway.clear_identity().await.unwrap();
  gateway.get_all_users().await.unwrap();

  assert!(fake.calls()[0].caller().is_anonymous());
  assert_eq!(fake.connects(), 1);
}

#[tokio::test]
async fn failed_handshake_is_retried_on_next_call() {
  let fake = FakeConnector::new(empty_list);
  fake.fail_next_handshakes(1);
  let gateway = fake.gateway();

  let err = gateway.get_all_users().await.unwrap_err();
  assert!(matches!(err, GatewayError::Initialization(_)));
  assert!(err.is_retryable());
  assert_eq!(gateway.state().await, State::Failed);
  assert!(gateway.failure().await.unwrap().contains("handshake"));
  assert!(fake.calls().is_empty());

  gateway.get_all_users().await.unwrap();
  assert_eq!(gateway.state().await, State::Ready);
  assert_eq!(gateway.failure().await, None);
  assert_eq!(fake.connects(), 2);
  assert_eq!(fake.handshakes(), 2);
}

#[tokio::test]
async fn abandoned_bootstrap_leaves_gateway_uninitialized() {
  let fake = FakeConnector::new(empty_list);
  fake.stall_connects(true);
  let gateway = fake.gateway();

  let attempt = tokio::time::timeout(Duration::from_millis(50), gateway.initialize()).await;
  assert!(attempt.is_err());
  assert_eq!(gateway.state().await, State::Uninitialized);
  assert_eq!(gateway.failure().await, None);

  fake.stall_connects(false);
  gateway.get_all_users().await.unwrap();
  assert_eq!(gateway.state().await, State::Ready);
  assert_eq!(fake.connects(), 2);
  assert_eq!(fake.handshakes(), 1);
}

#[tokio::test]
async fn calls_are_signed_by_the_bound_identity() {
  let fake = FakeConnector::new(empty_list);
  let gateway = fake.gateway();
  let alice = Identity::generate();

  gateway.update_identity(alice.clone()).await.unwrap();
  gateway.get_all_users().await.unwrap();

  let calls = fake.calls();
  let call = &calls[0];
  let (body, signature) = crate::transport::seal(call).unwrap();
  let signer = signature
    .unwrap()
    .verify(&call.endpoint, call.method, &body)
    .unwrap();
  assert_eq!(signer, *alice.principal());
}

#[tokio::test]
async fn production_uses_configured_root_key() {
  let fake = FakeConnector::new(empty_list);
  let key = RootKey::generate();
  let gateway = Gateway::new(fake.clone(), GatewayConfig::production(key.to_hex()));

  gateway.get_all_users().await.unwrap();

  assert_eq!(fake.handshakes(), 0);
  assert_eq!(fake.calls()[0].root, key.fingerprint());
}

#[tokio::test]
async fn production_without_root_key_fails_fast() {
  let fake = FakeConnector::new(empty_list);
  let config = GatewayConfig { root_key: None, ..GatewayConfig::production("") };
  let gateway = Gateway::new(fake.clone(), config);

  let err = gateway.initialize().await.unwrap_err();
  assert!(matches!(err, GatewayError::Initialization(_)));
  assert_eq!(gateway.state().await, State::Failed);
  assert_eq!(fake.handshakes(), 0);
}

// ─── Normalization across every method ───────────────────────────────────────

#[tokio::test]
async fn business_and_transport_failures_are_distinct_for_every_method() {
  let refusing = FakeConnector::new(refuse);
  let faulting = FakeConnector::new(fault);
  let refusing_gateway = refusing.gateway();
  let faulting_gateway = faulting.gateway();

  for method in Method::iter() {
    let refused = invoke(&refusing_gateway, method).await.unwrap_err();
    if method.is_fallible() {
      assert!(
        matches!(refused, GatewayError::Business(ref r) if r == "nope"),
        "{method}: {refused:?}"
      );
    } else {
      // A plain method cannot carry a refusal; the envelope is a protocol
      // violation.
      assert!(
        matches!(refused, GatewayError::Transport(TransportError::Malformed(_))),
        "{method}: {refused:?}"
      );
    }

    let faulted = invoke(&faulting_gateway, method).await.unwrap_err();
    assert!(
      matches!(faulted, GatewayError::Transport(TransportError::Rejected { .. })),
      "{method}: {faulted:?}"
    );
    assert!(!faulted.is_business());
  }

  assert_eq!(refusing.methods(), Method::iter().collect::<Vec<_>>());
  for call in refusing.calls() {
    assert_eq!(
      call.endpoint,
      refusing_gateway.config().services.id(call.method.service())
    );
  }
}

#[tokio::test]
async fn arguments_are_positional() {
  let fake = FakeConnector::new(empty_list);
  let gateway = fake.gateway();
  let alice = principal();

  gateway.get_recent_posts(Page::new(20, 40)).await.unwrap();
  gateway
    .get_posts_by_users(std::slice::from_ref(&alice), Page::new(5, 0))
    .await
    .unwrap();

  let calls = fake.calls();
  assert_eq!(calls[0].args, json!([20, 40]));
  assert_eq!(calls[1].args, json!([[alice], 5, 0]));
}

#[tokio::test]
async fn lookup_profile_treats_miss_as_unknown() {
  let missing = FakeConnector::new(|_| Ok(json!({ "Err": "User not found" })));
  assert_eq!(missing.gateway().lookup_profile(&principal()).await.unwrap(), None);

  let broken = FakeConnector::new(fault);
  assert!(broken.gateway().lookup_profile(&principal()).await.is_err());
}

// ─── Views ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_rechecks_availability() {
  let fake = FakeConnector::new(|call| match call.method {
    Method::UsernameAvailable => Ok(json!(false)),
    _ => panic!("unexpected {}", call.method),
  });
  let gateway = fake.gateway();

  let err = views::register(&gateway, CreateUserRequest::from_form("alice", "Alice", "", ""))
    .await
    .unwrap_err();
  assert_eq!(err.user_message(), "Username already taken");
  assert_eq!(fake.methods(), [Method::UsernameAvailable]);
}

#[tokio::test]
async fn register_rejects_invalid_form_without_calling() {
  let fake = FakeConnector::new(empty_list);
  let gateway = fake.gateway();

  let err = views::register(&gateway, CreateUserRequest::from_form("a", "Alice", "", ""))
    .await
    .unwrap_err();
  assert!(err.is_business());
  assert_eq!(fake.connects(), 0);
}

#[tokio::test]
async fn following_nobody_skips_the_post_query() {
  let fake = FakeConnector::new(empty_list);
  let gateway = fake.gateway();

  let feed = views::following_feed(&gateway, &principal(), Page::default())
    .await
    .unwrap();
  assert!(feed.is_empty());
  assert_eq!(fake.methods(), [Method::GetFollowing]);
}

#[tokio::test]
async fn hydrate_feed_looks_up_each_author_once() {
  let known = principal();
  let gone = principal();
  let known_json = known.as_str().to_string();
  let fake = FakeConnector::new(move |call| {
    if call.args[0] == known_json.as_str() {
      Ok(json!({ "Ok": {
        "principal": known_json,
        "username": "alice",
        "display_name": "Alice",
        "bio": "",
        "avatar_url": "",
        "is_verified": false,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z",
      }}))
    } else {
      Ok(json!({ "Err": "User not found" }))
    }
  });
  let gateway = fake.gateway();
  let posts = vec![
    post(3, &known, vec![]),
    post(2, &gone, vec![]),
    post(1, &known, vec![]),
  ];

  let feed = views::hydrate_feed(&gateway, posts).await.unwrap();

  assert_eq!(fake.calls().len(), 2);
  assert_eq!(feed[0].author.handle(), "@alice");
  assert_eq!(feed[1].author, views::Author::Unknown(gone));
  assert_eq!(feed[2].post.id, 1);
}

#[tokio::test]
async fn toggle_like_follows_the_liking_set() {
  let me = principal();
  let fake = FakeConnector::new(empty_list);
  let gateway = fake.gateway();

  let liked = post(1, &principal(), vec![me.clone()]);
  let not_liked = post(2, &principal(), vec![]);
  // The fake's reply is not a Post, so both calls fail to decode; only the
  // chosen method matters here.
  let _ = views::toggle_like(&gateway, &liked, &me).await;
  let _ = views::toggle_like(&gateway, &not_liked, &me).await;

  assert_eq!(fake.methods(), [Method::UnlikePost, Method::LikePost]);
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// An identity provider whose next login outcome is scripted.
struct ScriptedAuth {
  session: Mutex<Option<Identity>>,
  next:    Mutex<Option<Identity>>,
}

impl ScriptedAuth {
  fn new(session: Option<Identity>, next: Option<Identity>) -> Self {
    Self { session: Mutex::new(session), next: Mutex::new(next) }
  }
}

impl AuthClient for ScriptedAuth {
  async fn login(&self) -> Result<Option<Identity>, AuthError> {
    let next = self.next.lock().unwrap().take();
    if let Some(identity) = &next {
      *self.session.lock().unwrap() = Some(identity.clone());
    }
    Ok(next)
  }

  async fn logout(&self) -> Result<(), AuthError> {
    *self.session.lock().unwrap() = None;
    Ok(())
  }

  async fn is_authenticated(&self) -> Result<bool, AuthError> {
    Ok(self.session.lock().unwrap().is_some())
  }

  async fn identity(&self) -> Result<Identity, AuthError> {
    Ok(self.session.lock().unwrap().clone().unwrap_or_default())
  }
}

#[tokio::test]
async fn restore_binds_existing_session() {
  let fake = FakeConnector::new(empty_list);
  let alice = Identity::generate();
  let auth = ScriptedAuth::new(Some(alice.clone()), None);

  let session = AuthContext::restore(auth, Arc::new(fake.gateway())).await.unwrap();
  assert_eq!(session.principal().await, *alice.principal());
  assert_eq!(session.gateway().state().await, State::Ready);
}

#[tokio::test]
async fn logged_out_restore_stays_lazy() {
  let fake = FakeConnector::new(empty_list);
  let auth = ScriptedAuth::new(None, None);

  let session = AuthContext::restore(auth, Arc::new(fake.gateway())).await.unwrap();
  assert!(!session.is_authenticated().await.unwrap());
  assert_eq!(session.gateway().state().await, State::Uninitialized);
  assert_eq!(fake.connects(), 0);
}

#[tokio::test]
async fn login_and_logout_rebind_the_gateway() {
  let fake = FakeConnector::new(empty_list);
  let alice = Identity::generate();
  let auth = ScriptedAuth::new(None, Some(alice.clone()));
  let session = AuthContext::restore(auth, Arc::new(fake.gateway())).await.unwrap();

  assert_eq!(session.login().await.unwrap(), Some(alice.principal().clone()));
  session.gateway().get_all_users().await.unwrap();

  // The provider has nothing more to offer; the session is unchanged.
  assert_eq!(session.login().await.unwrap(), None);
  assert_eq!(session.principal().await, *alice.principal());

  session.logout().await.unwrap();
  session.gateway().get_all_users().await.unwrap();

  let callers: Vec<_> = fake.calls().into_iter().map(|c| c.caller().clone()).collect();
  assert_eq!(callers, [alice.principal().clone(), Principal::anonymous()]);
  assert_eq!(fake.connects(), 1);
}
