// API type definitions module
// Explicit request/response schemas for every route, validated before
// any store access

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CommunityConfig;
use crate::models::{iso8601, Post, Server};

/// Body of POST /api/posts
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl CreatePostRequest {
    /// Presence check: both required fields must be non-empty
    pub fn is_valid(&self) -> bool {
        !self.title.is_empty() && !self.content.is_empty()
    }

    /// Resolve defaults and produce the fully populated entity to persist
    pub fn into_post(self, defaults: &CommunityConfig, now: DateTime<Utc>) -> Post {
        Post {
            id: now.timestamp_millis(),
            title: self.title,
            content: self.content,
            platform: self
                .platform
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| defaults.default_platform.clone()),
            author: self
                .author
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| defaults.anonymous_post_author.clone()),
            created_at: iso8601(now),
        }
    }
}

/// Body of POST /api/servers
#[derive(Debug, Deserialize)]
pub struct CreateServerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl CreateServerRequest {
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.ip.is_empty() && !self.description.is_empty()
    }

    pub fn into_server(self, defaults: &CommunityConfig, now: DateTime<Utc>) -> Server {
        Server {
            id: now.timestamp_millis(),
            name: self.name,
            ip: self.ip,
            description: self.description,
            platform: self
                .platform
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| defaults.default_platform.clone()),
            author: self
                .author
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| defaults.anonymous_server_author.clone()),
            created_at: iso8601(now),
        }
    }
}

/// Body of POST /api/auth/register and /api/auth/login
#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn is_valid(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Register outcome and login failure envelope.
/// Auth failures use HTTP 200 with `success:false` by design.
#[derive(Debug, Serialize)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: &'static str,
}

impl AuthOutcome {
    pub const fn ok(message: &'static str) -> Self {
        Self {
            success: true,
            message,
        }
    }

    pub const fn failure(message: &'static str) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

/// Login success envelope
#[derive(Debug, Serialize)]
pub struct LoginSuccess {
    pub success: bool,
    pub token: String,
    pub user: PublicUser,
}

/// User projection returned by login: no password, no timestamps
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
}
