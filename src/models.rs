//! Domain models
//!
//! Entities stored as whole-collection JSON blobs: posts and servers are
//! ordered sequences (newest first), users a map keyed by username.
//! Ids are millisecond epoch timestamps and `createdAt` is kept as the
//! ISO-8601 string written at creation time, so stored JSON round-trips
//! byte-for-byte.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A forum post. Never mutated or deleted after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub platform: String,
    pub author: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// A community game-server listing. Same lifecycle as `Post`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub ip: String,
    pub description: String,
    pub platform: String,
    pub author: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// A registered user, stored under the `users` map keyed by username.
///
/// The password is stored in plaintext for behavioral parity with the
/// original service; see DESIGN.md for the known deficiency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl User {
    pub fn new(username: String, password: String, now: DateTime<Utc>) -> Self {
        Self {
            id: now.timestamp_millis(),
            username,
            password,
            created_at: iso8601(now),
        }
    }
}

/// Aggregate counts over the three collections. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub posts: usize,
    pub servers: usize,
    pub users: usize,
}

/// Format a timestamp the way the stored entities expect it:
/// millisecond precision with a `Z` suffix, e.g. `2024-01-01T00:00:00.000Z`
pub fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
