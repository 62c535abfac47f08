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


//! Document storage backend
//!
//! Collections of JSON documents with declared indexes, stored in SQLite.
//!
//! # Collections
//! - users: accounts, unique by email
//! - books: uploads with moderation status and a download counter
//! - downloads: append-only download events
//! - notifications: per-user messages with a read flag
//!
//! # Usage Example
//! ```no_run
//! use bookverse_store::docstore::{initialize, DocumentStore, NewBookDoc, Repository};
//! use bookverse_store::storage::models::NewUser;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = DocumentStore::open("./bookverse-docs.db").await?;
//! let report = initialize(&store).await?;
//! println!("built {} indexes", report.indexes_created.len());
//!
//! let repo = Repository::new(store);
//! let user = repo
//!     .create_user(&NewUser::new("Ana".into(), "ana@example.com".into(), "$2a$10$...".into()))
//!     .await?;
//! let book = repo.create_book(&NewBookDoc::new("Iracema", "José de Alencar", &user.id)).await?;
//! # Ok(())
//! # }
//! ```

pub mod documents;
pub mod initializer;
pub mod query;
pub mod repository;
pub mod schema;
pub mod store;

pub use documents::{
    BookDoc, DashboardStats, DownloadDoc, NewBookDoc, NotificationDoc, UserDoc, UserProfileUpdate,
};
pub use initializer::{bookverse_schema, initialize, InitReport};
pub use query::{Filter, FindOptions, SortDirection};
pub use repository::Repository;
pub use schema::{CollectionSpec, IndexKey, IndexKind, IndexSpec};
pub use store::{DocumentStore, DocumentTransaction};
