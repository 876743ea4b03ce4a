//! Social graph records, owned by the Social Graph service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::principal::Principal;

/// A directed edge: `follower` follows `followee`. Edges have no identity of
/// their own; the pair is the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
  pub follower:   Principal,
  pub followee:   Principal,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialStats {
  pub followers_count: u64,
  pub following_count: u64,
}
