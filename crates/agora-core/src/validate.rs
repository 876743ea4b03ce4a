//! Input rules shared by the profile and post forms and the services that
//! receive them.

use thiserror::Error;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 20;
pub const DISPLAY_NAME_MAX: usize = 50;
pub const BIO_MAX: usize = 160;
pub const POST_CONTENT_MAX: usize = 280;

/// Substituted when a new profile is created without an avatar.
pub const DEFAULT_AVATAR_URL: &str = "https://images.pexels.com/photos/220453/pexels-photo-220453.jpeg?auto=compress&cs=tinysrgb&w=120&h=120&dpr=1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("Username must be between 3 and 20 characters")]
  UsernameLength,

  #[error("Username may only contain lowercase letters, digits and underscores")]
  UsernameCharset,

  #[error("Display name is required")]
  DisplayNameEmpty,

  #[error("Display name must be at most 50 characters")]
  DisplayNameTooLong,

  #[error("Bio must be at most 160 characters")]
  BioTooLong,

  #[error("Post content cannot be empty")]
  ContentEmpty,

  #[error("Post content must be at most 280 characters")]
  ContentTooLong,
}

fn is_username_char(c: char) -> bool {
  c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
}

/// Rewrite free-form input into username alphabet: lowercase, with every
/// character outside `[a-z0-9_]` dropped.
pub fn normalize_username(input: &str) -> String {
  input
    .to_lowercase()
    .chars()
    .filter(|c| is_username_char(*c))
    .collect()
}

pub fn username(name: &str) -> Result<(), ValidationError> {
  let len = name.chars().count();
  if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
    return Err(ValidationError::UsernameLength);
  }
  if !name.chars().all(is_username_char) {
    return Err(ValidationError::UsernameCharset);
  }
  Ok(())
}

pub fn display_name(name: &str) -> Result<(), ValidationError> {
  if name.trim().is_empty() {
    return Err(ValidationError::DisplayNameEmpty);
  }
  if name.chars().count() > DISPLAY_NAME_MAX {
    return Err(ValidationError::DisplayNameTooLong);
  }
  Ok(())
}

pub fn bio(bio: &str) -> Result<(), ValidationError> {
  if bio.chars().count() > BIO_MAX {
    return Err(ValidationError::BioTooLong);
  }
  Ok(())
}

pub fn post_content(content: &str) -> Result<(), ValidationError> {
  if content.trim().is_empty() {
    return Err(ValidationError::ContentEmpty);
  }
  if content.chars().count() > POST_CONTENT_MAX {
    return Err(ValidationError::ContentTooLong);
  }
  Ok(())
}
