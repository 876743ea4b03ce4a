//! Subcommands, one per page flow.

use agora_core::{
  Principal,
  post::{CreatePostRequest, Page, PostId, UpdatePostRequest},
  profile::{CreateUserRequest, UpdateUserRequest, UserProfile},
  validate,
};
use agora_gateway::{
  Connector, Gateway, GatewayError,
  auth::{AuthClient, AuthContext},
  views,
};
use anyhow::{Result, anyhow, bail};
use clap::Subcommand;

use crate::render;

#[derive(Subcommand, Debug)]
pub enum Command {
  // ── Session ───────────────────────────────────────────────────────────────
  /// Start a session, creating an identity key if needed.
  Login,
  /// End the session and forget the identity key.
  Logout,
  /// Show the session principal and profile.
  Whoami,

  // ── Profiles ──────────────────────────────────────────────────────────────
  /// Create a profile for the session identity.
  Register {
    #[arg(long)]
    username:     String,
    #[arg(long)]
    display_name: String,
    #[arg(long, default_value = "")]
    bio:          String,
    #[arg(long, default_value = "")]
    avatar_url:   String,
  },
  /// Check whether a username can still be registered.
  CheckUsername { username: String },
  /// Show a profile with its posts and follow counts.
  Profile { username: String },
  /// Change fields of your profile.
  EditProfile {
    #[arg(long)]
    display_name: Option<String>,
    #[arg(long)]
    bio:          Option<String>,
    #[arg(long)]
    avatar_url:   Option<String>,
  },
  /// List profiles, optionally filtered by a search term.
  Users {
    #[arg(short, long)]
    search: Option<String>,
  },

  // ── Posts ─────────────────────────────────────────────────────────────────
  /// Publish a post.
  Post {
    content: String,
    #[arg(long = "media", value_name = "URL")]
    media:   Vec<String>,
  },
  EditPost {
    id:      PostId,
    #[arg(long)]
    content: Option<String>,
    #[arg(long = "media", value_name = "URL")]
    media:   Option<Vec<String>>,
  },
  DeletePost { id: PostId },
  Like { id: PostId },
  Unlike { id: PostId },
  /// Recent posts from everyone.
  Feed {
    #[arg(long, default_value_t = 20)]
    limit:  u64,
    #[arg(long, default_value_t = 0)]
    offset: u64,
  },
  /// Recent posts from people you follow.
  Timeline {
    #[arg(long, default_value_t = 20)]
    limit:  u64,
    #[arg(long, default_value_t = 0)]
    offset: u64,
  },

  // ── Social graph ──────────────────────────────────────────────────────────
  Follow { username: String },
  Unfollow { username: String },
  /// Who follows a user (default: you).
  Followers { username: Option<String> },
  /// Who a user follows (default: you).
  Following { username: Option<String> },
  /// Users who follow both you and `username`.
  Mutuals { username: String },
  Stats { username: Option<String> },
  /// People you may know.
  Suggest {
    #[arg(long, default_value_t = 5)]
    limit: u64,
  },
}

pub async fn run<A, C>(session: &AuthContext<A, C>, command: Command) -> Result<()>
where
  A: AuthClient,
  C: Connector,
{
  let gateway = session.gateway().as_ref();
  match command {
    Command::Login => match session.login().await? {
      Some(principal) => {
        println!("Logged in as {principal}");
        if views::current_profile(gateway).await.map_err(surface)?.is_none() {
          println!("No profile yet; create one with `agora register`.");
        }
      }
      None => println!("Login cancelled."),
    },
    Command::Logout => {
      session.logout().await?;
      println!("Logged out.");
    }
    Command::Whoami => {
      let me = session.principal().await;
      println!("{me}");
      if !me.is_anonymous()
        && let Some(profile) = views::current_profile(gateway).await.map_err(surface)?
      {
        render::profile(&profile);
      }
    }

    Command::Register { username, display_name, bio, avatar_url } => {
      require_session(session).await?;
      let form = CreateUserRequest::from_form(&username, &display_name, &bio, &avatar_url);
      let profile = views::register(gateway, form).await.map_err(surface)?;
      println!("Welcome, @{}!", profile.username);
    }
    Command::CheckUsername { username } => {
      let candidate = validate::normalize_username(&username);
      validate::username(&candidate)?;
      let available = gateway
        .is_username_available(&candidate)
        .await
        .map_err(surface)?;
      println!(
        "@{candidate} is {}",
        if available { "available" } else { "taken" }
      );
    }
    Command::Profile { username } => {
      let me = session.principal().await;
      let page = views::profile_page(gateway, &username, &me)
        .await
        .map_err(surface)?;
      render::profile_page(&page);
    }
    Command::EditProfile { display_name, bio, avatar_url } => {
      require_session(session).await?;
      let request = UpdateUserRequest { display_name, bio, avatar_url };
      if request.is_empty() {
        bail!("nothing to change");
      }
      request.validate()?;
      let profile = gateway.update_user(request).await.map_err(surface)?;
      render::profile(&profile);
    }
    Command::Users { search } => {
      let profiles = gateway.get_all_users().await.map_err(surface)?;
      let hits = views::search_profiles(&profiles, search.as_deref().unwrap_or(""));
      if hits.is_empty() {
        println!("No users found.");
      }
      for profile in hits {
        render::profile_line(profile);
      }
    }

    Command::Post { content, media } => {
      require_session(session).await?;
      let request = CreatePostRequest { content: content.trim().to_string(), media_urls: media };
      request.validate()?;
      let post = gateway.create_post(request).await.map_err(surface)?;
      println!("Posted #{}", post.id);
    }
    Command::EditPost { id, content, media } => {
      require_session(session).await?;
      let request = UpdatePostRequest { content, media_urls: media };
      request.validate()?;
      let post = gateway.update_post(id, request).await.map_err(surface)?;
      println!("Updated #{}", post.id);
    }
    Command::DeletePost { id } => {
      require_session(session).await?;
      gateway.delete_post(id).await.map_err(surface)?;
      println!("Deleted #{id}");
    }
    Command::Like { id } => {
      require_session(session).await?;
      let post = gateway.like_post(id).await.map_err(surface)?;
      println!("#{} now has {} likes", post.id, post.displayed_like_count());
    }
    Command::Unlike { id } => {
      require_session(session).await?;
      let post = gateway.unlike_post(id).await.map_err(surface)?;
      println!("#{} now has {} likes", post.id, post.displayed_like_count());
    }
    Command::Feed { limit, offset } => {
      let posts = gateway
        .get_recent_posts(Page::new(limit, offset))
        .await
        .map_err(surface)?;
      let me = session.principal().await;
      show_feed(gateway, &me, posts, "No posts yet.").await?;
    }
    Command::Timeline { limit, offset } => {
      let me = require_session(session).await?;
      let posts = views::following_feed(gateway, &me, Page::new(limit, offset))
        .await
        .map_err(surface)?;
      show_feed(gateway, &me, posts, "Nothing here yet. Follow someone with `agora follow`.")
        .await?;
    }

    Command::Follow { username } => {
      require_session(session).await?;
      let target = find(gateway, &username).await?;
      gateway.follow_user(&target.principal).await.map_err(surface)?;
      println!("Following @{}", target.username);
    }
    Command::Unfollow { username } => {
      require_session(session).await?;
      let target = find(gateway, &username).await?;
      gateway.unfollow_user(&target.principal).await.map_err(surface)?;
      println!("Unfollowed @{}", target.username);
    }
    Command::Followers { username } => {
      let user = subject(session, username).await?;
      let followers = gateway.get_followers(&user).await.map_err(surface)?;
      show_principals(gateway, followers, "No followers yet.").await?;
    }
    Command::Following { username } => {
      let user = subject(session, username).await?;
      let following = gateway.get_following(&user).await.map_err(surface)?;
      show_principals(gateway, following, "Not following anyone yet.").await?;
    }
    Command::Mutuals { username } => {
      let me = require_session(session).await?;
      let other = find(gateway, &username).await?;
      let mutuals = gateway
        .get_mutual_followers(&me, &other.principal)
        .await
        .map_err(surface)?;
      show_principals(gateway, mutuals, "No mutual followers.").await?;
    }
    Command::Stats { username } => {
      let user = subject(session, username).await?;
      let stats = gateway.get_social_stats(&user).await.map_err(surface)?;
      render::stats(&stats);
    }
    Command::Suggest { limit } => {
      let me = require_session(session).await?;
      let suggestions = gateway
        .get_follow_suggestions(&me, limit)
        .await
        .map_err(surface)?;
      show_principals(gateway, suggestions, "No suggestions right now.").await?;
    }
  }
  Ok(())
}

/// Turn a Gateway failure into the message a user should see. Business
/// refusals are shown verbatim; other failures keep their cause attached.
fn surface(e: GatewayError) -> anyhow::Error {
  match e {
    GatewayError::Business(reason) => anyhow!(reason),
    other => {
      let message = other.user_message();
      anyhow::Error::new(other).context(message)
    }
  }
}

async fn require_session<A: AuthClient, C: Connector>(
  session: &AuthContext<A, C>,
) -> Result<Principal> {
  let me = session.principal().await;
  if me.is_anonymous() {
    bail!("not logged in; run `agora login` first");
  }
  Ok(me)
}

/// The user named by `username`, or the session user.
async fn subject<A: AuthClient, C: Connector>(
  session: &AuthContext<A, C>,
  username: Option<String>,
) -> Result<Principal> {
  match username {
    Some(username) => Ok(find(session.gateway(), &username).await?.principal),
    None => require_session(session).await,
  }
}

async fn find<C: Connector>(gateway: &Gateway<C>, username: &str) -> Result<UserProfile> {
  let username = username.trim_start_matches('@');
  gateway
    .get_user_by_username(username)
    .await
    .map_err(surface)
}

async fn show_feed<C: Connector>(
  gateway: &Gateway<C>,
  me: &Principal,
  posts: Vec<agora_core::post::Post>,
  empty: &str,
) -> Result<()> {
  if posts.is_empty() {
    println!("{empty}");
    return Ok(());
  }
  for item in views::hydrate_feed(gateway, posts).await.map_err(surface)? {
    render::feed_item(&item, me);
  }
  Ok(())
}

async fn show_principals<C: Connector>(
  gateway: &Gateway<C>,
  principals: Vec<Principal>,
  empty: &str,
) -> Result<()> {
  if principals.is_empty() {
    println!("{empty}");
  }
  for principal in principals {
    match gateway.lookup_profile(&principal).await.map_err(surface)? {
      Some(profile) => render::profile_line(&profile),
      None => println!("  {principal}"),
    }
  }
  Ok(())
}
