//! User profiles, owned by the User Directory service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  principal::Principal,
  validate::{self, DEFAULT_AVATAR_URL, ValidationError},
};

/// One profile per principal. Profiles are updated in place and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
  pub principal:    Principal,
  /// Unique across the directory; see [`validate::username`].
  pub username:     String,
  pub display_name: String,
  pub bio:          String,
  pub avatar_url:   String,
  pub is_verified:  bool,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUserRequest {
  pub username:     String,
  pub display_name: String,
  pub bio:          String,
  pub avatar_url:   String,
}

impl CreateUserRequest {
  /// Build a request from raw form input: fields are trimmed and an empty
  /// avatar falls back to [`DEFAULT_AVATAR_URL`].
  pub fn from_form(
    username: &str,
    display_name: &str,
    bio: &str,
    avatar_url: &str,
  ) -> Self {
    let avatar_url = avatar_url.trim();
    Self {
      username:     username.trim().to_string(),
      display_name: display_name.trim().to_string(),
      bio:          bio.trim().to_string(),
      avatar_url:   if avatar_url.is_empty() {
        DEFAULT_AVATAR_URL.to_string()
      } else {
        avatar_url.to_string()
      },
    }
  }

  pub fn validate(&self) -> Result<(), ValidationError> {
    validate::username(&self.username)?;
    validate::display_name(&self.display_name)?;
    validate::bio(&self.bio)
  }
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserRequest {
  pub display_name: Option<String>,
  pub bio:          Option<String>,
  pub avatar_url:   Option<String>,
}

impl UpdateUserRequest {
  pub fn validate(&self) -> Result<(), ValidationError> {
    if let Some(name) = &self.display_name {
      validate::display_name(name)?;
    }
    if let Some(bio) = &self.bio {
      validate::bio(bio)?;
    }
    Ok(())
  }

  pub fn is_empty(&self) -> bool {
    self.display_name.is_none() && self.bio.is_none() && self.avatar_url.is_none()
  }
}
