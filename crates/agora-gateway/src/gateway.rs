//! The Gateway: one transport, one identity, one typed operation per remote
//! method.
//!
//! Lifecycle is an explicit state machine. A fresh Gateway is
//! [`State::Uninitialized`]; the first operation (or [`Gateway::update_identity`])
//! drives it through [`State::Initializing`] to [`State::Ready`], or to
//! [`State::Failed`] if connecting or the trust-root handshake fails. A failed
//! Gateway keeps no partial state and retries bootstrap on the next call.
//!
//! Bootstrap is serialized, so concurrent first calls connect once. Once
//! ready, calls share an immutable snapshot of the bindings: rebinding swaps
//! in a fresh snapshot while in-flight calls finish under the one they
//! started with.

use std::sync::{Arc, PoisonError, RwLock as SyncRwLock};

use agora_core::{
  Identity, Principal,
  graph::SocialStats,
  post::{CreatePostRequest, Page, Post, PostId, UpdatePostRequest},
  profile::{CreateUserRequest, UpdateUserRequest, UserProfile},
  wire::{Method, RootKey, Service, ServiceIds},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};

use crate::{
  config::{GatewayConfig, Mode},
  error::{GatewayError, GatewayResult},
  normalize,
  transport::{Agent, Call, Connector},
};

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  Uninitialized,
  Initializing,
  Ready,
  Failed,
}

enum Lifecycle<A> {
  Uninitialized,
  Initializing,
  Ready(Arc<Bindings<A>>),
  Failed(String),
}

/// A connected agent plus the trust root its calls present.
struct Link<A> {
  agent: Arc<A>,
  root:  String,
}

impl<A> Clone for Link<A> {
  fn clone(&self) -> Self {
    Self { agent: Arc::clone(&self.agent), root: self.root.clone() }
  }
}

/// A call handle for one service, bound to one identity.
struct ServiceHandle<A> {
  link:     Link<A>,
  endpoint: String,
  identity: Identity,
}

impl<A: Agent> ServiceHandle<A> {
  async fn call(&self, method: Method, args: Value) -> GatewayResult<Value> {
    let call = Call {
      endpoint: self.endpoint.clone(),
      method,
      identity: self.identity.clone(),
      root: self.link.root.clone(),
      args,
    };
    Ok(self.link.agent.call(call).await?)
  }
}

struct Bindings<A> {
  identity:       Identity,
  user_directory: ServiceHandle<A>,
  post_store:     ServiceHandle<A>,
  social_graph:   ServiceHandle<A>,
}

impl<A: Agent> Bindings<A> {
  fn bind(link: &Link<A>, identity: Identity, services: &ServiceIds) -> Self {
    let handle = |service| ServiceHandle {
      link:     link.clone(),
      endpoint: services.id(service).to_string(),
      identity: identity.clone(),
    };
    Self {
      user_directory: handle(Service::UserDirectory),
      post_store: handle(Service::PostStore),
      social_graph: handle(Service::SocialGraph),
      identity,
    }
  }

  fn handle(&self, service: Service) -> &ServiceHandle<A> {
    match service {
      Service::UserDirectory => &self.user_directory,
      Service::PostStore => &self.post_store,
      Service::SocialGraph => &self.social_graph,
    }
  }

  fn link(&self) -> &Link<A> { &self.user_directory.link }
}

pub struct Gateway<C: Connector> {
  connector: C,
  config:    GatewayConfig,
  identity:  RwLock<Identity>,
  /// Never held across an await, so it can be reset from `Drop`.
  lifecycle: SyncRwLock<Lifecycle<C::Agent>>,
  bootstrap: Mutex<()>,
}

fn set_lifecycle<A>(lifecycle: &SyncRwLock<Lifecycle<A>>, next: Lifecycle<A>) {
  *lifecycle.write().unwrap_or_else(PoisonError::into_inner) = next;
}

/// Holds the lifecycle at `Initializing` while bootstrap runs. If bootstrap
/// is abandoned before [`Bootstrapping::finish`], e.g. because the future
/// driving it was dropped, the lifecycle goes back to `Uninitialized`.
struct Bootstrapping<'a, A> {
  lifecycle: &'a SyncRwLock<Lifecycle<A>>,
  finished:  bool,
}

impl<'a, A> Bootstrapping<'a, A> {
  fn begin(lifecycle: &'a SyncRwLock<Lifecycle<A>>) -> Self {
    set_lifecycle(lifecycle, Lifecycle::Initializing);
    Self { lifecycle, finished: false }
  }

  fn finish(mut self, outcome: Lifecycle<A>) {
    self.finished = true;
    set_lifecycle(self.lifecycle, outcome);
  }
}

impl<A> Drop for Bootstrapping<'_, A> {
  fn drop(&mut self) {
    if !self.finished {
      set_lifecycle(self.lifecycle, Lifecycle::Uninitialized);
    }
  }
}

impl<C: Connector> Gateway<C> {
  /// A new, uninitialized Gateway bound to the anonymous identity.
  pub fn new(connector: C, config: GatewayConfig) -> Self {
    Self {
      connector,
      config,
      identity: RwLock::new(Identity::anonymous()),
      lifecycle: SyncRwLock::new(Lifecycle::Uninitialized),
      bootstrap: Mutex::new(()),
    }
  }

  pub fn config(&self) -> &GatewayConfig { &self.config }

  fn lifecycle(&self) -> std::sync::RwLockReadGuard<'_, Lifecycle<C::Agent>> {
    self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
  }

  pub async fn state(&self) -> State {
    match &*self.lifecycle() {
      Lifecycle::Uninitialized => State::Uninitialized,
      Lifecycle::Initializing => State::Initializing,
      Lifecycle::Ready(_) => State::Ready,
      Lifecycle::Failed(_) => State::Failed,
    }
  }

  /// Reason for the last bootstrap failure, while [`State::Failed`].
  pub async fn failure(&self) -> Option<String> {
    match &*self.lifecycle() {
      Lifecycle::Failed(reason) => Some(reason.clone()),
      _ => None,
    }
  }

  /// The principal new calls are attributed to.
  pub async fn principal(&self) -> Principal {
    self.identity.read().await.principal().clone()
  }

  /// Bootstrap now instead of on the first call.
  pub async fn initialize(&self) -> GatewayResult<()> {
    self.bindings().await.map(drop)
  }

  /// Bind `identity` to all subsequent calls, bootstrapping first if needed.
  ///
  /// Every per-service handle is rebuilt. Calls already in flight complete
  /// under the identity they were issued with.
  pub async fn update_identity(&self, identity: Identity) -> GatewayResult<()> {
    let _guard = self.bootstrap.lock().await;
    *self.identity.write().await = identity.clone();

    let Some(current) = self.ready() else {
      self.initialize_locked().await?;
      return Ok(());
    };

    tracing::info!(principal = %identity.principal(), "rebinding identity");
    let rebound = Bindings::bind(current.link(), identity, &self.config.services);
    set_lifecycle(&self.lifecycle, Lifecycle::Ready(Arc::new(rebound)));
    Ok(())
  }

  /// Rebind to the anonymous identity, as on logout.
  pub async fn clear_identity(&self) -> GatewayResult<()> {
    self.update_identity(Identity::anonymous()).await
  }

  fn ready(&self) -> Option<Arc<Bindings<C::Agent>>> {
    match &*self.lifecycle() {
      Lifecycle::Ready(bindings) => Some(Arc::clone(bindings)),
      _ => None,
    }
  }

  async fn bindings(&self) -> GatewayResult<Arc<Bindings<C::Agent>>> {
    if let Some(bindings) = self.ready() {
      return Ok(bindings);
    }
    let _guard = self.bootstrap.lock().await;
    // Another caller may have finished bootstrap while we waited.
    if let Some(bindings) = self.ready() {
      return Ok(bindings);
    }
    self.initialize_locked().await
  }

  /// Connect, establish trust, and bind the current identity. The caller
  /// holds the bootstrap lock.
  async fn initialize_locked(&self) -> GatewayResult<Arc<Bindings<C::Agent>>> {
    let bootstrapping = Bootstrapping::begin(&self.lifecycle);
    match self.connect().await {
      Ok(link) => {
        let identity = self.identity.read().await.clone();
        tracing::info!(
          host = self.config.host(),
          principal = %identity.principal(),
          "gateway ready"
        );
        let bindings = Arc::new(Bindings::bind(&link, identity, &self.config.services));
        bootstrapping.finish(Lifecycle::Ready(Arc::clone(&bindings)));
        Ok(bindings)
      }
      Err(e) => {
        bootstrapping.finish(Lifecycle::Failed(e.to_string()));
        Err(e)
      }
    }
  }

  async fn connect(&self) -> GatewayResult<Link<C::Agent>> {
    let host = self.config.host().to_string();
    let agent = self
      .connector
      .connect(host.clone())
      .await
      .map_err(|e| GatewayError::Initialization(format!("cannot reach {host}: {e}")))?;

    let root = match self.config.mode {
      Mode::Development => {
        let status = agent.status().await.map_err(|e| {
          tracing::warn!(error = %e, %host, "trust-root handshake failed");
          GatewayError::Initialization(format!("trust-root handshake failed: {e}"))
        })?;
        RootKey::from_hex(&status.root_key).ok_or_else(|| {
          GatewayError::Initialization("server published a malformed root key".to_string())
        })?
      }
      Mode::Production => {
        let configured = self.config.root_key.as_deref().ok_or_else(|| {
          GatewayError::Initialization(
            "production mode requires a configured root key".to_string(),
          )
        })?;
        RootKey::from_hex(configured).ok_or_else(|| {
          GatewayError::Initialization("configured root key is malformed".to_string())
        })?
      }
    };

    Ok(Link { agent: Arc::new(agent), root: root.fingerprint() })
  }

  async fn invoke<T: DeserializeOwned>(
    &self,
    method: Method,
    args: Value,
  ) -> GatewayResult<T> {
    let bindings = self.bindings().await?;
    tracing::debug!(
      method = method.name(),
      caller = %bindings.identity.principal(),
      "dispatching call"
    );
    let reply = bindings.handle(method.service()).call(method, args).await?;
    if method.is_fallible() {
      normalize::fallible(reply)
    } else {
      normalize::plain(reply)
    }
  }

  // ─── User Directory ────────────────────────────────────────────────────────

  pub async fn create_user(
    &self,
    request: CreateUserRequest,
  ) -> GatewayResult<UserProfile> {
    self.invoke(Method::CreateUser, json!([request])).await
  }

  pub async fn get_user(&self, principal: &Principal) -> GatewayResult<UserProfile> {
    self.invoke(Method::GetUser, json!([principal])).await
  }

  pub async fn get_user_by_username(
    &self,
    username: &str,
  ) -> GatewayResult<UserProfile> {
    self.invoke(Method::GetUserByUsername, json!([username])).await
  }

  pub async fn get_current_user(&self) -> GatewayResult<UserProfile> {
    self.invoke(Method::GetCurrentUser, json!([])).await
  }

  pub async fn update_user(
    &self,
    request: UpdateUserRequest,
  ) -> GatewayResult<UserProfile> {
    self.invoke(Method::UpdateUser, json!([request])).await
  }

  /// Forwarded as-is on every call; callers debounce.
  pub async fn is_username_available(&self, username: &str) -> GatewayResult<bool> {
    self.invoke(Method::UsernameAvailable, json!([username])).await
  }

  pub async fn get_all_users(&self) -> GatewayResult<Vec<UserProfile>> {
    self.invoke(Method::GetAllUsers, json!([])).await
  }

  /// Like [`Gateway::get_user`], but a miss is `Ok(None)` rather than an
  /// error. Transport faults are still errors.
  pub async fn lookup_profile(
    &self,
    principal: &Principal,
  ) -> GatewayResult<Option<UserProfile>> {
    match self.get_user(principal).await {
      Ok(profile) => Ok(Some(profile)),
      Err(GatewayError::Business(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }

  // ─── Post Store ────────────────────────────────────────────────────────────

  pub async fn create_post(&self, request: CreatePostRequest) -> GatewayResult<Post> {
    self.invoke(Method::CreatePost, json!([request])).await
  }

  pub async fn get_post(&self, id: PostId) -> GatewayResult<Post> {
    self.invoke(Method::GetPost, json!([id])).await
  }

  pub async fn update_post(
    &self,
    id: PostId,
    request: UpdatePostRequest,
  ) -> GatewayResult<Post> {
    self.invoke(Method::UpdatePost, json!([id, request])).await
  }

  pub async fn delete_post(&self, id: PostId) -> GatewayResult<()> {
    self.invoke(Method::DeletePost, json!([id])).await
  }

  pub async fn like_post(&self, id: PostId) -> GatewayResult<Post> {
    self.invoke(Method::LikePost, json!([id])).await
  }

  pub async fn unlike_post(&self, id: PostId) -> GatewayResult<Post> {
    self.invoke(Method::UnlikePost, json!([id])).await
  }

  pub async fn get_recent_posts(&self, page: Page) -> GatewayResult<Vec<Post>> {
    self
      .invoke(Method::GetRecentPosts, json!([page.limit, page.offset]))
      .await
  }

  pub async fn get_posts_by_users(
    &self,
    authors: &[Principal],
    page: Page,
  ) -> GatewayResult<Vec<Post>> {
    self
      .invoke(Method::GetPostsByUsers, json!([authors, page.limit, page.offset]))
      .await
  }

  pub async fn get_user_posts(&self, author: &Principal) -> GatewayResult<Vec<Post>> {
    self.invoke(Method::GetUserPosts, json!([author])).await
  }

  // ─── Social Graph ──────────────────────────────────────────────────────────

  /// Following an already-followed principal succeeds.
  pub async fn follow_user(&self, followee: &Principal) -> GatewayResult<()> {
    self.invoke(Method::FollowUser, json!([followee])).await
  }

  pub async fn unfollow_user(&self, followee: &Principal) -> GatewayResult<()> {
    self.invoke(Method::UnfollowUser, json!([followee])).await
  }

  pub async fn is_following(
    &self,
    follower: &Principal,
    followee: &Principal,
  ) -> GatewayResult<bool> {
    self.invoke(Method::IsFollowing, json!([follower, followee])).await
  }

  pub async fn get_followers(&self, user: &Principal) -> GatewayResult<Vec<Principal>> {
    self.invoke(Method::GetFollowers, json!([user])).await
  }

  pub async fn get_following(&self, user: &Principal) -> GatewayResult<Vec<Principal>> {
    self.invoke(Method::GetFollowing, json!([user])).await
  }

  pub async fn get_mutual_followers(
    &self,
    a: &Principal,
    b: &Principal,
  ) -> GatewayResult<Vec<Principal>> {
    self.invoke(Method::GetMutualFollowers, json!([a, b])).await
  }

  pub async fn get_social_stats(&self, user: &Principal) -> GatewayResult<SocialStats> {
    self.invoke(Method::GetSocialStats, json!([user])).await
  }

  pub async fn get_follow_suggestions(
    &self,
    user: &Principal,
    limit: u64,
  ) -> GatewayResult<Vec<Principal>> {
    self
      .invoke(Method::GetFollowSuggestions, json!([user, limit]))
      .await
  }
}
