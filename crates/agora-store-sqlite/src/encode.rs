//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with nanosecond precision and a `Z`
//! suffix, so lexical order in SQL matches chronological order. Media URL
//! lists are stored as compact JSON.

use agora_core::{Principal, post::Post, profile::UserProfile};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Principal ───────────────────────────────────────────────────────────────

pub fn decode_principal(s: &str) -> Result<Principal> {
  s.parse()
    .map_err(|_| Error::Corrupt(format!("principal {s:?}")))
}

pub fn decode_principals(raw: Vec<String>) -> Result<Vec<Principal>> {
  raw.iter().map(|s| decode_principal(s)).collect()
}

// ─── Media ───────────────────────────────────────────────────────────────────

pub fn encode_media(urls: &[String]) -> Result<String> {
  Ok(serde_json::to_string(urls)?)
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// Column values of a `users` row, decoded on the async side.
pub struct RawUser {
  pub principal:    String,
  pub username:     String,
  pub display_name: String,
  pub bio:          String,
  pub avatar_url:   String,
  pub is_verified:  bool,
  pub created_at:   String,
  pub updated_at:   String,
}

/// Column list matching [`RawUser::from_row`].
pub const USER_COLUMNS: &str = "principal, username, display_name, bio, avatar_url, is_verified, created_at, updated_at";

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      principal:    row.get(0)?,
      username:     row.get(1)?,
      display_name: row.get(2)?,
      bio:          row.get(3)?,
      avatar_url:   row.get(4)?,
      is_verified:  row.get(5)?,
      created_at:   row.get(6)?,
      updated_at:   row.get(7)?,
    })
  }

  pub fn into_profile(self) -> Result<UserProfile> {
    Ok(UserProfile {
      principal:    decode_principal(&self.principal)?,
      username:     self.username,
      display_name: self.display_name,
      bio:          self.bio,
      avatar_url:   self.avatar_url,
      is_verified:  self.is_verified,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

/// A `posts` row plus its liking set.
pub struct RawPost {
  pub id:         i64,
  pub author:     String,
  pub content:    String,
  pub media_urls: String,
  pub created_at: String,
  pub updated_at: String,
  pub likes:      Vec<String>,
}

impl RawPost {
  pub fn into_post(self) -> Result<Post> {
    let likes = decode_principals(self.likes)?;
    Ok(Post {
      id:         u64::try_from(self.id)
        .map_err(|_| Error::Corrupt(format!("post id {}", self.id)))?,
      author:     decode_principal(&self.author)?,
      content:    self.content,
      media_urls: serde_json::from_str(&self.media_urls)?,
      like_count: likes.len() as u64,
      likes,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
