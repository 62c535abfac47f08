//! Database models for the relational backend
//!
//! Row structs map one-to-one onto the `users` and `books` tables created in
//! `migrations.rs`. `New*` structs carry only caller-supplied columns; ids,
//! counters and timestamps are filled in by SQLite.
//!
//! # SQLite Adaptations
//! - Enums stored as lowercase TEXT guarded by CHECK constraints
//! - DateTime stored as TEXT in ISO 8601 format with millisecond precision

use crate::error::{BookverseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENUMS
// ============================================================================

/// Moderation state of an uploaded book
///
/// `Pending` is the only non-terminal state: moderation moves it to either
/// `Approved` or `Rejected` and nothing moves it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl BookStatus {
    pub const ALL: [BookStatus; 3] = [BookStatus::Pending, BookStatus::Approved, BookStatus::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Pending => "pending",
            BookStatus::Approved => "approved",
            BookStatus::Rejected => "rejected",
        }
    }

    /// Whether moderation may move a book from `self` to `next`
    pub fn can_transition_to(&self, next: BookStatus) -> bool {
        matches!(
            (self, next),
            (BookStatus::Pending, BookStatus::Approved) | (BookStatus::Pending, BookStatus::Rejected)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookStatus::Pending)
    }
}

impl FromStr for BookStatus {
    type Err = BookverseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(BookStatus::Pending),
            "approved" => Ok(BookStatus::Approved),
            "rejected" => Ok(BookStatus::Rejected),
            other => Err(BookverseError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = BookverseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            other => Err(BookverseError::invalid_input(format!("Unknown role: {}", other))),
        }
    }
}

// ============================================================================
// MAIN ENTITIES
// ============================================================================

/// User account row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String, // UserRole as lowercase text
    #[sqlx(default)]
    pub phone: Option<String>,
    #[sqlx(default)]
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Get role as enum
    pub fn get_role(&self) -> Result<UserRole> {
        self.role.parse()
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.get_role(), Ok(UserRole::Admin))
    }
}

/// Book row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    #[sqlx(default)]
    pub description: Option<String>,
    #[sqlx(default)]
    pub category: Option<String>,
    #[sqlx(default)]
    pub file_url: Option<String>,
    #[sqlx(default)]
    pub cover_url: Option<String>,
    pub downloads: i64,
    pub status: String, // BookStatus as lowercase text
    pub added_by: i64,  // Foreign key to users.id
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Get status as enum
    ///
    /// Fails only if the row was written around the CHECK constraint.
    pub fn get_status(&self) -> Result<BookStatus> {
        self.status.parse()
    }
}

// ============================================================================
// INSERTABLE MODELS
// ============================================================================

/// New user to insert
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
}

impl NewUser {
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        Self {
            name,
            email,
            password_hash,
            role: UserRole::User,
            phone: None,
            profile_image: None,
        }
    }

    pub fn admin(name: String, email: String, password_hash: String) -> Self {
        Self {
            role: UserRole::Admin,
            ..Self::new(name, email, password_hash)
        }
    }
}

/// New book to insert
///
/// `status` left as `None` takes the column default (`pending`).
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub file_url: Option<String>,
    pub cover_url: Option<String>,
    pub status: Option<BookStatus>,
    pub added_by: i64,
}

impl NewBook {
    pub fn new(title: String, author: String, added_by: i64) -> Self {
        Self {
            title,
            author,
            description: None,
            category: None,
            file_url: None,
            cover_url: None,
            status: None,
            added_by,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_status(mut self, status: BookStatus) -> Self {
        self.status = Some(status);
        self
    }
}
