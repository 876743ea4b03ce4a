//! Names and envelopes shared by both ends of the RPC surface.
//!
//! A call addresses a [`Service`] by its endpoint id and a [`Method`] by its
//! snake_case name, and carries its arguments as a JSON array. Fallible
//! methods reply with a [`RemoteResult`]; the rest reply with their value
//! directly.

use std::fmt;

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Header carrying the hex SHA-256 fingerprint of the trusted root key.
pub const ROOT_HEADER: &str = "x-agora-root";

// ─── Envelope ────────────────────────────────────────────────────────────────

/// The reply of a fallible method: `{"Ok": value}` or `{"Err": "reason"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteResult<T> {
  Ok(T),
  Err(String),
}

impl<T> From<Result<T, String>> for RemoteResult<T> {
  fn from(value: Result<T, String>) -> Self {
    match value {
      Ok(v) => Self::Ok(v),
      Err(e) => Self::Err(e),
    }
  }
}

impl<T> From<RemoteResult<T>> for Result<T, String> {
  fn from(value: RemoteResult<T>) -> Self {
    match value {
      RemoteResult::Ok(v) => Ok(v),
      RemoteResult::Err(e) => Err(e),
    }
  }
}

/// Body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
  /// Hex-encoded root key.
  pub root_key: String,
  pub version:  String,
}

// ─── Trust root ──────────────────────────────────────────────────────────────

/// The key clients must trust before any call is accepted.
///
/// Development servers generate one at startup and publish it through the
/// status endpoint; production clients are configured with it.
#[derive(Clone, PartialEq, Eq)]
pub struct RootKey([u8; 32]);

impl RootKey {
  pub fn generate() -> Self {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    Self(key)
  }

  pub fn from_hex(s: &str) -> Option<Self> {
    let bytes = hex::decode(s.trim()).ok()?;
    Some(Self(bytes.try_into().ok()?))
  }

  pub fn to_hex(&self) -> String { hex::encode(self.0) }

  /// Value of [`ROOT_HEADER`] for requests trusting this key.
  pub fn fingerprint(&self) -> String { hex::encode(Sha256::digest(self.0)) }
}

impl fmt::Debug for RootKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("RootKey").field(&self.fingerprint()).finish()
  }
}

// ─── Services and methods ────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Service {
  UserDirectory,
  PostStore,
  SocialGraph,
}

/// Endpoint ids under which each service is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceIds {
  pub user_directory: String,
  pub post_store:     String,
  pub social_graph:   String,
}

impl ServiceIds {
  pub fn id(&self, service: Service) -> &str {
    match service {
      Service::UserDirectory => &self.user_directory,
      Service::PostStore => &self.post_store,
      Service::SocialGraph => &self.social_graph,
    }
  }

  /// The service reachable under endpoint `id`, if any.
  pub fn resolve(&self, id: &str) -> Option<Service> {
    [Service::UserDirectory, Service::PostStore, Service::SocialGraph]
      .into_iter()
      .find(|s| self.id(*s) == id)
  }
}

impl Default for ServiceIds {
  fn default() -> Self {
    Self {
      user_directory: "rdmx6-jaaaa-aaaaa-aaadq-cai".to_string(),
      post_store:     "rrkah-fqaaa-aaaaa-aaaaq-cai".to_string(),
      social_graph:   "ryjl3-tyaaa-aaaaa-aaaba-cai".to_string(),
    }
  }
}

/// Every remote method across the three services.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Display,
  EnumString,
  AsRefStr,
  IntoStaticStr,
  EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Method {
  // User Directory
  CreateUser,
  GetUser,
  GetUserByUsername,
  GetCurrentUser,
  UpdateUser,
  UsernameAvailable,
  GetAllUsers,
  // Post Store
  CreatePost,
  GetPost,
  UpdatePost,
  DeletePost,
  LikePost,
  UnlikePost,
  GetRecentPosts,
  GetPostsByUsers,
  GetUserPosts,
  // Social Graph
  FollowUser,
  UnfollowUser,
  IsFollowing,
  GetFollowers,
  GetFollowing,
  GetMutualFollowers,
  GetSocialStats,
  GetFollowSuggestions,
}

impl Method {
  pub fn service(self) -> Service {
    use Method::*;
    match self {
      CreateUser | GetUser | GetUserByUsername | GetCurrentUser | UpdateUser
      | UsernameAvailable | GetAllUsers => Service::UserDirectory,
      CreatePost | GetPost | UpdatePost | DeletePost | LikePost | UnlikePost
      | GetRecentPosts | GetPostsByUsers | GetUserPosts => Service::PostStore,
      FollowUser | UnfollowUser | IsFollowing | GetFollowers | GetFollowing
      | GetMutualFollowers | GetSocialStats | GetFollowSuggestions => {
        Service::SocialGraph
      }
    }
  }

  /// Whether the reply is wrapped in a [`RemoteResult`].
  pub fn is_fallible(self) -> bool {
    use Method::*;
    matches!(
      self,
      CreateUser
        | GetUser
        | GetUserByUsername
        | GetCurrentUser
        | UpdateUser
        | CreatePost
        | GetPost
        | UpdatePost
        | DeletePost
        | LikePost
        | UnlikePost
        | FollowUser
        | UnfollowUser
    )
  }

  pub fn name(self) -> &'static str { self.into() }
}
