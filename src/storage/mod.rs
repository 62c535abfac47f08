// BookVerse - Book sharing platform storage layer
// Copyright (C) 2025 BookVerse contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Relational storage backend
//!
//! This module declares the `users` and `books` tables on SQLite with sqlx
//! and provides the queries the API layer runs against them.
//!
//! # Database Schema
//! - users: accounts, unique by email
//! - books: uploaded books with moderation status, owned by a user
//!
//! # Usage Example
//! ```no_run
//! use bookverse_store::storage::{Database, queries, models::{NewBook, NewUser}};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./bookverse.db").await?;
//!
//! let user_id = queries::insert_user(
//!     db.pool(),
//!     &NewUser::new("Ana".to_string(), "ana@example.com".to_string(), "$2a$10$...".to_string()),
//! ).await?;
//!
//! let book_id = queries::insert_book(
//!     db.pool(),
//!     &NewBook::new("Dom Casmurro".to_string(), "Machado de Assis".to_string(), user_id),
//! ).await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

// Re-export commonly used types
pub use database::{Database, DatabaseStats};
pub use models::{Book, BookStatus, NewBook, NewUser, User, UserRole};
