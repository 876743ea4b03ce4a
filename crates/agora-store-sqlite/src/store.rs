//! [`SqliteStore`], the SQLite implementation of the three service traits.

use std::path::Path;

use agora_core::{
  Error as Rejection, Principal,
  graph::{FollowEdge, SocialStats},
  post::{CreatePostRequest, Page, Post, PostId, UpdatePostRequest},
  profile::{CreateUserRequest, UpdateUserRequest, UserProfile},
  service::{PostStore, SocialGraph, UserDirectory},
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;

use crate::{
  Error, Result,
  encode::{
    RawPost, RawUser, USER_COLUMNS, decode_dt, decode_principal,
    decode_principals, encode_dt, encode_media,
  },
  schema::SCHEMA,
};

/// What a connection closure hands back when the request may be refused:
/// the outer `Result` is the database, the inner one the domain.
type Outcome<T> = std::result::Result<T, Rejection>;

// ─── Store ───────────────────────────────────────────────────────────────────

/// All three Agora services backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every
/// closure passed to the connection runs to completion before the next one
/// starts, so check-then-write sequences inside one closure do not race.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Outgoing edges of `follower`, oldest first.
  pub async fn edges_from(&self, follower: Principal) -> Result<Vec<FollowEdge>> {
    let follower_str = follower.to_string();

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT followee, created_at FROM follows WHERE follower = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![follower_str], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(followee, created_at)| {
        Ok(FollowEdge {
          follower:   follower.clone(),
          followee:   decode_principal(&followee)?,
          created_at: decode_dt(&created_at)?,
        })
      })
      .collect()
  }

  /// Load posts whose ids come from `sql` (bound to `params`), keeping the
  /// query's order.
  async fn posts_where<P>(&self, sql: &'static str, params: P) -> Result<Vec<Post>>
  where
    P: rusqlite::Params + Send + 'static,
  {
    let raws: Vec<RawPost> = self
      .conn
      .call(move |conn| {
        let ids = {
          let mut stmt = conn.prepare(sql)?;
          stmt
            .query_map(params, |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
          if let Some(post) = load_post(conn, id)? {
            posts.push(post);
          }
        }
        Ok(posts)
      })
      .await?;

    raws.into_iter().map(RawPost::into_post).collect()
  }

  async fn principals_where<P>(
    &self,
    sql: &'static str,
    params: P,
  ) -> Result<Vec<Principal>>
  where
    P: rusqlite::Params + Send + 'static,
  {
    let raw: Vec<String> = self
      .conn
      .call(move |conn| Ok(query_strings(conn, sql, params)?))
      .await?;
    decode_principals(raw)
  }
}

// ─── Connection-side helpers ─────────────────────────────────────────────────

fn require_caller(caller: &Principal, action: &'static str) -> Result<()> {
  if caller.is_anonymous() {
    return Err(Rejection::Anonymous(action).into());
  }
  Ok(())
}

fn post_key(id: PostId) -> Result<i64> {
  // Ids beyond i64 were never issued, so the post cannot exist.
  i64::try_from(id).map_err(|_| Rejection::PostNotFound.into())
}

/// Convert a [`Page`] into SQL `LIMIT` / `OFFSET` values.
fn sql_window(page: Page) -> (i64, i64) {
  (
    i64::try_from(page.limit).unwrap_or(i64::MAX),
    i64::try_from(page.offset).unwrap_or(i64::MAX),
  )
}

fn query_strings<P: rusqlite::Params>(
  conn: &rusqlite::Connection,
  sql: &str,
  params: P,
) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(sql)?;
  stmt
    .query_map(params, |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<_>>>()
}

fn load_user_where(
  conn: &rusqlite::Connection,
  column: &str,
  value: &str,
) -> rusqlite::Result<Option<RawUser>> {
  conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
      rusqlite::params![value],
      RawUser::from_row,
    )
    .optional()
}

fn load_post(
  conn: &rusqlite::Connection,
  id: i64,
) -> rusqlite::Result<Option<RawPost>> {
  let row = conn
    .query_row(
      "SELECT id, author, content, media_urls, created_at, updated_at
       FROM posts WHERE id = ?1",
      rusqlite::params![id],
      |row| {
        Ok(RawPost {
          id:         row.get(0)?,
          author:     row.get(1)?,
          content:    row.get(2)?,
          media_urls: row.get(3)?,
          created_at: row.get(4)?,
          updated_at: row.get(5)?,
          likes:      Vec::new(),
        })
      },
    )
    .optional()?;

  match row {
    Some(mut post) => {
      post.likes = query_strings(
        conn,
        "SELECT principal FROM post_likes WHERE post_id = ?1 ORDER BY rowid",
        rusqlite::params![id],
      )?;
      Ok(Some(post))
    }
    None => Ok(None),
  }
}

// ─── UserDirectory impl ──────────────────────────────────────────────────────

impl UserDirectory for SqliteStore {
  type Error = Error;

  async fn create_user(
    &self,
    caller: Principal,
    request: CreateUserRequest,
  ) -> Result<UserProfile> {
    require_caller(&caller, "create profiles")?;
    request.validate().map_err(Rejection::from)?;

    let now = encode_dt(Utc::now());
    let principal = caller.to_string();

    let outcome: Outcome<RawUser> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if load_user_where(&tx, "principal", &principal)?.is_some() {
          return Ok(Err(Rejection::UserExists));
        }
        if load_user_where(&tx, "username", &request.username)?.is_some() {
          return Ok(Err(Rejection::UsernameTaken));
        }
        tx.execute(
          "INSERT INTO users (
             principal, username, display_name, bio, avatar_url,
             is_verified, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
          rusqlite::params![
            principal,
            request.username,
            request.display_name,
            request.bio,
            request.avatar_url,
            now,
          ],
        )?;
        tx.commit()?;

        Ok(Ok(RawUser {
          principal,
          username: request.username,
          display_name: request.display_name,
          bio: request.bio,
          avatar_url: request.avatar_url,
          is_verified: false,
          created_at: now.clone(),
          updated_at: now,
        }))
      })
      .await?;

    outcome?.into_profile()
  }

  async fn update_user(
    &self,
    caller: Principal,
    request: UpdateUserRequest,
  ) -> Result<UserProfile> {
    require_caller(&caller, "update profiles")?;
    request.validate().map_err(Rejection::from)?;

    let now = encode_dt(Utc::now());
    let principal = caller.to_string();

    let outcome: Outcome<RawUser> = self
      .conn
      .call(move |conn| {
        let Some(mut user) = load_user_where(conn, "principal", &principal)? else {
          return Ok(Err(Rejection::UserNotFound));
        };
        if let Some(display_name) = request.display_name {
          user.display_name = display_name;
        }
        if let Some(bio) = request.bio {
          user.bio = bio;
        }
        if let Some(avatar_url) = request.avatar_url {
          user.avatar_url = avatar_url;
        }
        user.updated_at = now;

        conn.execute(
          "UPDATE users SET display_name = ?2, bio = ?3, avatar_url = ?4, updated_at = ?5
           WHERE principal = ?1",
          rusqlite::params![
            principal,
            user.display_name,
            user.bio,
            user.avatar_url,
            user.updated_at,
          ],
        )?;
        Ok(Ok(user))
      })
      .await?;

    outcome?.into_profile()
  }

  async fn get_user(&self, principal: Principal) -> Result<UserProfile> {
    let principal = principal.to_string();
    let raw = self
      .conn
      .call(move |conn| Ok(load_user_where(conn, "principal", &principal)?))
      .await?;
    raw.ok_or(Rejection::UserNotFound)?.into_profile()
  }

  async fn get_user_by_username(&self, username: String) -> Result<UserProfile> {
    let raw = self
      .conn
      .call(move |conn| Ok(load_user_where(conn, "username", &username)?))
      .await?;
    raw.ok_or(Rejection::UserNotFound)?.into_profile()
  }

  async fn username_available(&self, username: String) -> Result<bool> {
    let taken = self
      .conn
      .call(move |conn| Ok(load_user_where(conn, "username", &username)?.is_some()))
      .await?;
    Ok(!taken)
  }

  async fn list_users(&self) -> Result<Vec<UserProfile>> {
    let raws: Vec<RawUser> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY rowid"))?;
        let rows = stmt
          .query_map([], RawUser::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUser::into_profile).collect()
  }
}

// ─── PostStore impl ──────────────────────────────────────────────────────────

impl PostStore for SqliteStore {
  type Error = Error;

  async fn create_post(
    &self,
    caller: Principal,
    request: CreatePostRequest,
  ) -> Result<Post> {
    require_caller(&caller, "create posts")?;
    request.validate().map_err(Rejection::from)?;

    let now = encode_dt(Utc::now());
    let author = caller.to_string();
    let media = encode_media(&request.media_urls)?;

    let raw: RawPost = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO posts (author, content, media_urls, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)",
          rusqlite::params![author, request.content, media, now],
        )?;
        Ok(RawPost {
          id: conn.last_insert_rowid(),
          author,
          content: request.content,
          media_urls: media,
          created_at: now.clone(),
          updated_at: now,
          likes: Vec::new(),
        })
      })
      .await?;

    tracing::debug!(post_id = raw.id, "post created");
    raw.into_post()
  }

  async fn get_post(&self, id: PostId) -> Result<Post> {
    let key = post_key(id)?;
    let raw = self
      .conn
      .call(move |conn| Ok(load_post(conn, key)?))
      .await?;
    raw.ok_or(Rejection::PostNotFound)?.into_post()
  }

  async fn update_post(
    &self,
    caller: Principal,
    id: PostId,
    request: UpdatePostRequest,
  ) -> Result<Post> {
    require_caller(&caller, "update posts")?;
    request.validate().map_err(Rejection::from)?;

    let key = post_key(id)?;
    let now = encode_dt(Utc::now());
    let caller = caller.to_string();
    let media = request.media_urls.as_deref().map(encode_media).transpose()?;

    let outcome: Outcome<RawPost> = self
      .conn
      .call(move |conn| {
        let Some(mut post) = load_post(conn, key)? else {
          return Ok(Err(Rejection::PostNotFound));
        };
        if post.author != caller {
          return Ok(Err(Rejection::NotAuthor("update")));
        }
        if let Some(content) = request.content {
          post.content = content;
        }
        if let Some(media) = media {
          post.media_urls = media;
        }
        post.updated_at = now;

        conn.execute(
          "UPDATE posts SET content = ?2, media_urls = ?3, updated_at = ?4 WHERE id = ?1",
          rusqlite::params![key, post.content, post.media_urls, post.updated_at],
        )?;
        Ok(Ok(post))
      })
      .await?;

    outcome?.into_post()
  }

  async fn delete_post(&self, caller: Principal, id: PostId) -> Result<()> {
    require_caller(&caller, "delete posts")?;

    let key = post_key(id)?;
    let caller = caller.to_string();

    let outcome: Outcome<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let author: Option<String> = tx
          .query_row(
            "SELECT author FROM posts WHERE id = ?1",
            rusqlite::params![key],
            |row| row.get(0),
          )
          .optional()?;
        match author {
          None => return Ok(Err(Rejection::PostNotFound)),
          Some(author) if author != caller => {
            return Ok(Err(Rejection::NotAuthor("delete")));
          }
          Some(_) => {}
        }
        tx.execute("DELETE FROM post_likes WHERE post_id = ?1", rusqlite::params![key])?;
        tx.execute("DELETE FROM posts WHERE id = ?1", rusqlite::params![key])?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;

    Ok(outcome?)
  }

  async fn like_post(&self, caller: Principal, id: PostId) -> Result<Post> {
    require_caller(&caller, "like posts")?;

    let key = post_key(id)?;
    let now = encode_dt(Utc::now());
    let caller = caller.to_string();

    let outcome: Outcome<RawPost> = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row("SELECT 1 FROM posts WHERE id = ?1", rusqlite::params![key], |_| Ok(()))
          .optional()?
          .is_some();
        if !exists {
          return Ok(Err(Rejection::PostNotFound));
        }
        conn.execute(
          "INSERT OR IGNORE INTO post_likes (post_id, principal, liked_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![key, caller, now],
        )?;
        Ok(load_post(conn, key)?.ok_or(Rejection::PostNotFound))
      })
      .await?;

    outcome?.into_post()
  }

  async fn unlike_post(&self, caller: Principal, id: PostId) -> Result<Post> {
    require_caller(&caller, "unlike posts")?;

    let key = post_key(id)?;
    let caller = caller.to_string();

    let outcome: Outcome<RawPost> = self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM post_likes WHERE post_id = ?1 AND principal = ?2",
          rusqlite::params![key, caller],
        )?;
        Ok(load_post(conn, key)?.ok_or(Rejection::PostNotFound))
      })
      .await?;

    outcome?.into_post()
  }

  async fn recent_posts(&self, page: Page) -> Result<Vec<Post>> {
    let (limit, offset) = sql_window(page);
    self
      .posts_where(
        "SELECT id FROM posts ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
        (limit, offset),
      )
      .await
  }

  async fn posts_by_authors(
    &self,
    authors: Vec<Principal>,
    page: Page,
  ) -> Result<Vec<Post>> {
    let (limit, offset) = sql_window(page);
    let authors = serde_json::to_string(&authors)?;
    self
      .posts_where(
        "SELECT id FROM posts
         WHERE author IN (SELECT value FROM json_each(?1))
         ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
        (authors, limit, offset),
      )
      .await
  }

  async fn posts_by_author(&self, author: Principal) -> Result<Vec<Post>> {
    self
      .posts_where(
        "SELECT id FROM posts WHERE author = ?1 ORDER BY id",
        (author.to_string(),),
      )
      .await
  }
}

// ─── SocialGraph impl ────────────────────────────────────────────────────────

impl SocialGraph for SqliteStore {
  type Error = Error;

  async fn follow(&self, caller: Principal, followee: Principal) -> Result<()> {
    require_caller(&caller, "follow others")?;
    if caller == followee {
      return Err(Rejection::SelfFollow.into());
    }

    let now = encode_dt(Utc::now());
    let (follower_str, followee_str) = (caller.to_string(), followee.to_string());

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO follows (follower, followee, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![follower_str, followee_str, now],
        )?)
      })
      .await?;

    if inserted == 0 {
      tracing::debug!(%caller, %followee, "follow edge already present");
    }
    Ok(())
  }

  async fn unfollow(&self, caller: Principal, followee: Principal) -> Result<()> {
    require_caller(&caller, "unfollow others")?;

    let (follower_str, followee_str) = (caller.to_string(), followee.to_string());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM follows WHERE follower = ?1 AND followee = ?2",
          rusqlite::params![follower_str, followee_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn is_following(&self, follower: Principal, followee: Principal) -> Result<bool> {
    let (follower, followee) = (follower.to_string(), followee.to_string());
    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM follows WHERE follower = ?1 AND followee = ?2",
              rusqlite::params![follower, followee],
              |_| Ok(()),
            )
            .optional()?
            .is_some(),
        )
      })
      .await?;
    Ok(found)
  }

  async fn followers(&self, user: Principal) -> Result<Vec<Principal>> {
    self
      .principals_where(
        "SELECT follower FROM follows WHERE followee = ?1 ORDER BY rowid",
        (user.to_string(),),
      )
      .await
  }

  async fn following(&self, user: Principal) -> Result<Vec<Principal>> {
    let edges = self.edges_from(user).await?;
    Ok(edges.into_iter().map(|e| e.followee).collect())
  }

  async fn mutual_followers(&self, a: Principal, b: Principal) -> Result<Vec<Principal>> {
    self
      .principals_where(
        "SELECT fa.follower FROM follows fa
         JOIN follows fb ON fb.follower = fa.follower AND fb.followee = ?2
         WHERE fa.followee = ?1
         ORDER BY fa.rowid",
        (a.to_string(), b.to_string()),
      )
      .await
  }

  async fn stats(&self, user: Principal) -> Result<SocialStats> {
    let user = user.to_string();
    let (followers, following): (i64, i64) = self
      .conn
      .call(move |conn| {
        let followers = conn.query_row(
          "SELECT COUNT(*) FROM follows WHERE followee = ?1",
          rusqlite::params![user],
          |row| row.get(0),
        )?;
        let following = conn.query_row(
          "SELECT COUNT(*) FROM follows WHERE follower = ?1",
          rusqlite::params![user],
          |row| row.get(0),
        )?;
        Ok((followers, following))
      })
      .await?;

    Ok(SocialStats {
      followers_count: followers.unsigned_abs(),
      following_count: following.unsigned_abs(),
    })
  }

  async fn suggestions(&self, user: Principal, limit: u64) -> Result<Vec<Principal>> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    if limit == 0 {
      return Ok(Vec::new());
    }
    let user_str = user.to_string();

    let raw: Vec<String> = self
      .conn
      .call(move |conn| {
        const FOLLOWING: &str =
          "SELECT followee FROM follows WHERE follower = ?1 ORDER BY rowid";

        let following = query_strings(conn, FOLLOWING, rusqlite::params![user_str])?;
        let mut suggestions: Vec<String> = Vec::new();

        'outer: for followed in &following {
          for candidate in query_strings(conn, FOLLOWING, rusqlite::params![followed])? {
            if candidate != user_str
              && !following.contains(&candidate)
              && !suggestions.contains(&candidate)
            {
              suggestions.push(candidate);
              if suggestions.len() >= limit {
                break 'outer;
              }
            }
          }
        }
        Ok(suggestions)
      })
      .await?;

    decode_principals(raw)
  }
}
