//! SQL schema for the Agora SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One profile per principal. Insertion order (rowid) is listing order.
CREATE TABLE IF NOT EXISTS users (
    principal     TEXT PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    display_name  TEXT NOT NULL,
    bio           TEXT NOT NULL,
    avatar_url    TEXT NOT NULL,
    is_verified   INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,   -- RFC 3339 UTC, nanosecond precision
    updated_at    TEXT NOT NULL
);

-- AUTOINCREMENT: ids of deleted posts are never handed out again.
CREATE TABLE IF NOT EXISTS posts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    author      TEXT NOT NULL,
    content     TEXT NOT NULL,
    media_urls  TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- The liking set. A post's like count is the number of rows here.
CREATE TABLE IF NOT EXISTS post_likes (
    post_id    INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    principal  TEXT NOT NULL,
    liked_at   TEXT NOT NULL,
    PRIMARY KEY (post_id, principal)
);

-- Directed follow edges; the pair is the key.
CREATE TABLE IF NOT EXISTS follows (
    follower    TEXT NOT NULL,
    followee    TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (follower, followee)
);

CREATE INDEX IF NOT EXISTS posts_author_idx   ON posts(author);
CREATE INDEX IF NOT EXISTS posts_created_idx  ON posts(created_at);
CREATE INDEX IF NOT EXISTS follows_followee_idx ON follows(followee);

PRAGMA user_version = 1;
";
