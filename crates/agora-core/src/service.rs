//! The three service traits and their shared error contract.
//!
//! The traits are implemented by backends (e.g. `agora-store-sqlite`) and
//! exposed over RPC by `agora-api`. Mutating methods take the caller's
//! principal explicitly; the API layer supplies it from the request.
//!
//! All methods return `Send` futures so the traits can be used behind a
//! multi-threaded tokio runtime with `axum`.

use std::future::Future;

use crate::{
  graph::SocialStats,
  post::{CreatePostRequest, Page, Post, PostId, UpdatePostRequest},
  principal::Principal,
  profile::{CreateUserRequest, UpdateUserRequest, UserProfile},
};

/// Error contract for service backends.
///
/// A backend fails in two ways: it refuses the request for a domain reason
/// (the reason goes back to the caller inside the reply envelope), or it
/// faults (the call itself fails).
pub trait ServiceError: std::error::Error + Send + Sync + 'static {
  /// The domain refusal carried by this error, or `None` for a fault.
  fn rejection(&self) -> Option<&crate::Error>;
}

// ─── User Directory ──────────────────────────────────────────────────────────

pub trait UserDirectory: Send + Sync {
  type Error: ServiceError;

  /// Create the caller's profile. Fails if the caller is anonymous, already
  /// has a profile, or asks for a taken username.
  fn create_user(
    &self,
    caller: Principal,
    request: CreateUserRequest,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  /// Apply a partial update to the caller's profile.
  fn update_user(
    &self,
    caller: Principal,
    request: UpdateUserRequest,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    principal: Principal,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  fn get_user_by_username(
    &self,
    username: String,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  fn username_available(
    &self,
    username: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Every profile, oldest first.
  fn list_users(
    &self,
  ) -> impl Future<Output = Result<Vec<UserProfile>, Self::Error>> + Send + '_;
}

// ─── Post Store ──────────────────────────────────────────────────────────────

pub trait PostStore: Send + Sync {
  type Error: ServiceError;

  fn create_post(
    &self,
    caller: Principal,
    request: CreatePostRequest,
  ) -> impl Future<Output = Result<Post, Self::Error>> + Send + '_;

  fn get_post(
    &self,
    id: PostId,
  ) -> impl Future<Output = Result<Post, Self::Error>> + Send + '_;

  /// Author-only partial update.
  fn update_post(
    &self,
    caller: Principal,
    id: PostId,
    request: UpdatePostRequest,
  ) -> impl Future<Output = Result<Post, Self::Error>> + Send + '_;

  /// Author-only delete.
  fn delete_post(
    &self,
    caller: Principal,
    id: PostId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Add the caller to the post's liking set. Liking twice is a no-op.
  fn like_post(
    &self,
    caller: Principal,
    id: PostId,
  ) -> impl Future<Output = Result<Post, Self::Error>> + Send + '_;

  /// Remove the caller from the post's liking set, if present.
  fn unlike_post(
    &self,
    caller: Principal,
    id: PostId,
  ) -> impl Future<Output = Result<Post, Self::Error>> + Send + '_;

  /// All posts, newest first, windowed by `page`.
  fn recent_posts(
    &self,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Post>, Self::Error>> + Send + '_;

  /// Posts by any of `authors`, newest first, windowed by `page`.
  fn posts_by_authors(
    &self,
    authors: Vec<Principal>,
    page: Page,
  ) -> impl Future<Output = Result<Vec<Post>, Self::Error>> + Send + '_;

  /// Every post by `author`, in creation order.
  fn posts_by_author(
    &self,
    author: Principal,
  ) -> impl Future<Output = Result<Vec<Post>, Self::Error>> + Send + '_;
}

// ─── Social Graph ────────────────────────────────────────────────────────────

pub trait SocialGraph: Send + Sync {
  type Error: ServiceError;

  /// Insert the edge `caller → followee`. Re-inserting an existing edge
  /// succeeds without creating a second one.
  fn follow(
    &self,
    caller: Principal,
    followee: Principal,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove the edge `caller → followee`, if present.
  fn unfollow(
    &self,
    caller: Principal,
    followee: Principal,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn is_following(
    &self,
    follower: Principal,
    followee: Principal,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn followers(
    &self,
    user: Principal,
  ) -> impl Future<Output = Result<Vec<Principal>, Self::Error>> + Send + '_;

  fn following(
    &self,
    user: Principal,
  ) -> impl Future<Output = Result<Vec<Principal>, Self::Error>> + Send + '_;

  /// Principals that follow both `a` and `b`.
  fn mutual_followers(
    &self,
    a: Principal,
    b: Principal,
  ) -> impl Future<Output = Result<Vec<Principal>, Self::Error>> + Send + '_;

  fn stats(
    &self,
    user: Principal,
  ) -> impl Future<Output = Result<SocialStats, Self::Error>> + Send + '_;

  /// Friends-of-friends that `user` does not follow yet, at most `limit`.
  fn suggestions(
    &self,
    user: Principal,
    limit: u64,
  ) -> impl Future<Output = Result<Vec<Principal>, Self::Error>> + Send + '_;
}
