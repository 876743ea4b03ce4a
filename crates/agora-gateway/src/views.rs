//! Caller-side compositions of Gateway operations.
//!
//! These back the application's pages. Nothing here is cached: every helper
//! re-fetches, and joins across services tolerate missing records.

use std::collections::BTreeMap;

use agora_core::{
  Error as Rejection, Principal,
  graph::SocialStats,
  post::{Page, Post},
  profile::{CreateUserRequest, UserProfile},
};

use crate::{
  error::{GatewayError, GatewayResult},
  gateway::Gateway,
  transport::Connector,
};

/// The author of a post, as far as the User Directory knows.
#[derive(Debug, Clone, PartialEq)]
pub enum Author {
  Known(UserProfile),
  /// The principal has no profile.
  Unknown(Principal),
}

impl Author {
  /// `@username`, or the raw principal when unknown.
  pub fn handle(&self) -> String {
    match self {
      Author::Known(profile) => format!("@{}", profile.username),
      Author::Unknown(principal) => principal.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
  pub post:   Post,
  pub author: Author,
}

/// Join `posts` with their authors' profiles, one lookup per distinct
/// author.
pub async fn hydrate_feed<C: Connector>(
  gateway: &Gateway<C>,
  posts: Vec<Post>,
) -> GatewayResult<Vec<FeedItem>> {
  let mut profiles: BTreeMap<Principal, Option<UserProfile>> = BTreeMap::new();
  for post in &posts {
    if !profiles.contains_key(&post.author) {
      let profile = gateway.lookup_profile(&post.author).await?;
      profiles.insert(post.author.clone(), profile);
    }
  }
  Ok(
    posts
      .into_iter()
      .map(|post| {
        let author = match profiles.get(&post.author).cloned().flatten() {
          Some(profile) => Author::Known(profile),
          None => Author::Unknown(post.author.clone()),
        };
        FeedItem { post, author }
      })
      .collect(),
  )
}

/// Posts by everyone `me` follows, newest first.
pub async fn following_feed<C: Connector>(
  gateway: &Gateway<C>,
  me: &Principal,
  page: Page,
) -> GatewayResult<Vec<Post>> {
  let following = gateway.get_following(me).await?;
  if following.is_empty() {
    return Ok(Vec::new());
  }
  gateway.get_posts_by_users(&following, page).await
}

/// Case-insensitive substring match over username and display name. An
/// empty term matches everyone.
pub fn search_profiles<'a>(
  profiles: &'a [UserProfile],
  term: &str,
) -> Vec<&'a UserProfile> {
  let term = term.trim().to_lowercase();
  profiles
    .iter()
    .filter(|p| {
      term.is_empty()
        || p.username.to_lowercase().contains(&term)
        || p.display_name.to_lowercase().contains(&term)
    })
    .collect()
}

/// Unlike if `me` already likes `post`, else like. Returns the post as the
/// Post Store now has it.
pub async fn toggle_like<C: Connector>(
  gateway: &Gateway<C>,
  post: &Post,
  me: &Principal,
) -> GatewayResult<Post> {
  if post.is_liked_by(me) {
    gateway.unlike_post(post.id).await
  } else {
    gateway.like_post(post.id).await
  }
}

/// The caller's profile, or `None` if they have not registered yet.
pub async fn current_profile<C: Connector>(
  gateway: &Gateway<C>,
) -> GatewayResult<Option<UserProfile>> {
  match gateway.get_current_user().await {
    Ok(profile) => Ok(Some(profile)),
    Err(GatewayError::Business(_)) => Ok(None),
    Err(e) => Err(e),
  }
}

/// Validate the form, recheck the username at submission time, then create
/// the profile.
///
/// Validation failures and a taken username come back as
/// [`GatewayError::Business`], like any other refusal.
pub async fn register<C: Connector>(
  gateway: &Gateway<C>,
  form: CreateUserRequest,
) -> GatewayResult<UserProfile> {
  form
    .validate()
    .map_err(|e| GatewayError::Business(e.to_string()))?;
  if !gateway.is_username_available(&form.username).await? {
    return Err(GatewayError::Business(Rejection::UsernameTaken.to_string()));
  }
  gateway.create_user(form).await
}

/// Everything the profile page shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePage {
  pub profile:      UserProfile,
  pub posts:        Vec<Post>,
  pub stats:        SocialStats,
  /// Whether the viewer follows this profile; `None` for anonymous viewers
  /// and for one's own profile.
  pub is_following: Option<bool>,
}

pub async fn profile_page<C: Connector>(
  gateway: &Gateway<C>,
  username: &str,
  viewer: &Principal,
) -> GatewayResult<ProfilePage> {
  let profile = gateway.get_user_by_username(username).await?;
  let mut posts = gateway.get_user_posts(&profile.principal).await?;
  posts.reverse();
  let stats = gateway.get_social_stats(&profile.principal).await?;
  let is_following = if viewer.is_anonymous() || *viewer == profile.principal {
    None
  } else {
    Some(gateway.is_following(viewer, &profile.principal).await?)
  };
  Ok(ProfilePage { profile, posts, stats, is_following })
}
