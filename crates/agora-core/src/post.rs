//! Posts, owned by the Post Store service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  principal::Principal,
  validate::{self, ValidationError},
};

pub type PostId = u64;

/// A post as returned by the Post Store.
///
/// `like_count` and `likes` describe the same fact twice. The store keeps them
/// in step, but nothing on the wire enforces it, so readers should go through
/// [`Post::displayed_like_count`] rather than either field alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
  pub id:         PostId,
  pub author:     Principal,
  pub content:    String,
  pub media_urls: Vec<String>,
  /// Principals that currently like this post. Set semantics: no duplicates.
  pub likes:      Vec<Principal>,
  pub like_count: u64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Post {
  pub fn is_liked_by(&self, principal: &Principal) -> bool {
    self.likes.contains(principal)
  }

  pub fn is_authored_by(&self, principal: &Principal) -> bool {
    &self.author == principal
  }

  /// Whether the stored counter agrees with the liking set.
  pub fn like_count_consistent(&self) -> bool {
    self.like_count == self.likes.len() as u64
  }

  /// The like count to show. The liking set wins when the two disagree,
  /// because it is the only field that can answer "did I like this".
  pub fn displayed_like_count(&self) -> u64 { self.likes.len() as u64 }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostRequest {
  pub content:    String,
  pub media_urls: Vec<String>,
}

impl CreatePostRequest {
  pub fn validate(&self) -> Result<(), ValidationError> {
    validate::post_content(&self.content)
  }
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePostRequest {
  pub content:    Option<String>,
  pub media_urls: Option<Vec<String>>,
}

impl UpdatePostRequest {
  pub fn validate(&self) -> Result<(), ValidationError> {
    match &self.content {
      Some(content) => validate::post_content(content),
      None => Ok(()),
    }
  }
}

/// A window over a recency-ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
  pub limit:  u64,
  pub offset: u64,
}

impl Page {
  pub fn new(limit: u64, offset: u64) -> Self { Self { limit, offset } }

  /// The page that follows this one.
  pub fn next(self) -> Self {
    Self {
      limit:  self.limit,
      offset: self.offset.saturating_add(self.limit),
    }
  }
}

impl Default for Page {
  fn default() -> Self { Self::new(20, 0) }
}
