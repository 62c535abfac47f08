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


//! BookVerse storage layer
//!
//! - [`docstore`]: document collections (users, books, downloads,
//!   notifications), their index set and a typed repository
//! - [`storage`]: relational `users` / `books` tables with constraints
//!   and migrations
//!
//! The two backends share the error type and SQLite plumbing but never
//! exchange data.

pub mod config;
pub mod docstore;
pub mod error;
pub mod storage;

pub use config::StoreConfig;
pub use error::{BookverseError, Result};
