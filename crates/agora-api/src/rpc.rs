//! `POST /rpc/{service_id}/{method}`
//!
//! Arguments arrive as a JSON array in declaration order and are decoded into
//! a tuple per method. Methods marked fallible by [`Method::is_fallible`]
//! reply with a [`RemoteResult`]; a domain refusal from the store becomes
//! `{"Err": reason}` with status `200`. Store faults become `500`.

use agora_core::{
  Principal,
  post::Page,
  service::{PostStore, ServiceError, SocialGraph, UserDirectory},
  wire::{Method, RemoteResult, Service},
};
use axum::{Json, extract::State};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{AppState, Backend, caller::Caller, error::ApiError};

pub async fn handler<S>(
  State(state): State<AppState<S>>,
  Caller { principal: caller, service, method, args }: Caller,
) -> Result<Json<Value>, ApiError>
where
  S: Backend,
{
  tracing::debug!(%service, method = method.name(), %caller, "rpc call");

  let store = state.store.as_ref();
  let reply = match service {
    Service::UserDirectory => users(store, caller, method, args).await?,
    Service::PostStore => posts(store, caller, method, args).await?,
    Service::SocialGraph => graph(store, caller, method, args).await?,
  };
  Ok(Json(reply))
}

// ─── Per-service dispatch ────────────────────────────────────────────────────

async fn users<S: UserDirectory>(
  store: &S,
  caller: Principal,
  method: Method,
  args: Value,
) -> Result<Value, ApiError> {
  match method {
    Method::CreateUser => {
      let (request,) = decode(args)?;
      fallible(store.create_user(caller, request).await)
    }
    Method::GetUser => {
      let (principal,) = decode(args)?;
      fallible(store.get_user(principal).await)
    }
    Method::GetUserByUsername => {
      let (username,) = decode(args)?;
      fallible(store.get_user_by_username(username).await)
    }
    Method::GetCurrentUser => fallible(store.get_user(caller).await),
    Method::UpdateUser => {
      let (request,) = decode(args)?;
      fallible(store.update_user(caller, request).await)
    }
    Method::UsernameAvailable => {
      let (username,) = decode(args)?;
      plain(store.username_available(username).await)
    }
    Method::GetAllUsers => plain(store.list_users().await),
    other => Err(unrouted(other)),
  }
}

async fn posts<S: PostStore>(
  store: &S,
  caller: Principal,
  method: Method,
  args: Value,
) -> Result<Value, ApiError> {
  match method {
    Method::CreatePost => {
      let (request,) = decode(args)?;
      fallible(store.create_post(caller, request).await)
    }
    Method::GetPost => {
      let (id,) = decode(args)?;
      fallible(store.get_post(id).await)
    }
    Method::UpdatePost => {
      let (id, request) = decode(args)?;
      fallible(store.update_post(caller, id, request).await)
    }
    Method::DeletePost => {
      let (id,) = decode(args)?;
      fallible(store.delete_post(caller, id).await)
    }
    Method::LikePost => {
      let (id,) = decode(args)?;
      fallible(store.like_post(caller, id).await)
    }
    Method::UnlikePost => {
      let (id,) = decode(args)?;
      fallible(store.unlike_post(caller, id).await)
    }
    Method::GetRecentPosts => {
      let (limit, offset) = decode(args)?;
      plain(store.recent_posts(Page::new(limit, offset)).await)
    }
    Method::GetPostsByUsers => {
      let (authors, limit, offset) = decode(args)?;
      plain(store.posts_by_authors(authors, Page::new(limit, offset)).await)
    }
    Method::GetUserPosts => {
      let (author,) = decode(args)?;
      plain(store.posts_by_author(author).await)
    }
    other => Err(unrouted(other)),
  }
}

async fn graph<S: SocialGraph>(
  store: &S,
  caller: Principal,
  method: Method,
  args: Value,
) -> Result<Value, ApiError> {
  match method {
    Method::FollowUser => {
      let (followee,) = decode(args)?;
      fallible(store.follow(caller, followee).await)
    }
    Method::UnfollowUser => {
      let (followee,) = decode(args)?;
      fallible(store.unfollow(caller, followee).await)
    }
    Method::IsFollowing => {
      let (follower, followee) = decode(args)?;
      plain(store.is_following(follower, followee).await)
    }
    Method::GetFollowers => {
      let (user,) = decode(args)?;
      plain(store.followers(user).await)
    }
    Method::GetFollowing => {
      let (user,) = decode(args)?;
      plain(store.following(user).await)
    }
    Method::GetMutualFollowers => {
      let (a, b) = decode(args)?;
      plain(store.mutual_followers(a, b).await)
    }
    Method::GetSocialStats => {
      let (user,) = decode(args)?;
      plain(store.stats(user).await)
    }
    Method::GetFollowSuggestions => {
      let (user, limit) = decode(args)?;
      plain(store.suggestions(user, limit).await)
    }
    other => Err(unrouted(other)),
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn decode<T: DeserializeOwned>(args: Value) -> Result<T, ApiError> {
  serde_json::from_value(args)
    .map_err(|e| ApiError::BadRequest(format!("invalid arguments: {e}")))
}

fn encode<T: Serialize>(value: T) -> Result<Value, ApiError> {
  serde_json::to_value(value).map_err(|e| ApiError::Store(Box::new(e)))
}

/// Reply of a fallible method: refusals go into the envelope.
fn fallible<T: Serialize, E: ServiceError>(
  result: Result<T, E>,
) -> Result<Value, ApiError> {
  match result {
    Ok(value) => encode(RemoteResult::Ok(value)),
    Err(e) => match e.rejection().map(ToString::to_string) {
      Some(reason) => encode(RemoteResult::<T>::Err(reason)),
      None => Err(ApiError::Store(Box::new(e))),
    },
  }
}

/// Reply of a plain method: the bare value.
fn plain<T: Serialize, E: ServiceError>(
  result: Result<T, E>,
) -> Result<Value, ApiError> {
  match result {
    Ok(value) => encode(value),
    Err(e) => Err(match e.rejection().map(ToString::to_string) {
      Some(reason) => ApiError::BadRequest(reason),
      None => ApiError::Store(Box::new(e)),
    }),
  }
}

fn unrouted(method: Method) -> ApiError {
  ApiError::NotFound(format!("{} is served by {}", method.name(), method.service()))
}
