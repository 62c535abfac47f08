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


//! Typed operations over the BookVerse collections
//!
//! The repository fills in ids, timestamps and defaults at construction
//! time (`status = pending`, `downloads = 0`, `read = false`) and checks
//! references the document store cannot check on its own (`uploadedBy`,
//! `userId`, `bookId`) inside the same transaction as the write.

use crate::docstore::documents::{
    BookDoc, DashboardStats, DownloadDoc, NewBookDoc, NotificationDoc, UserDoc, UserProfileUpdate,
};
use crate::docstore::initializer::{BOOKS, DOWNLOADS, NOTIFICATIONS, USERS};
use crate::docstore::query::{Filter, FindOptions};
use crate::docstore::store::{DocumentStore, DocumentTransaction};
use crate::error::{BookverseError, Result};
use crate::storage::models::{BookStatus, NewUser, UserRole};
use chrono::{DateTime, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Current time at the precision documents store
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn decode<T: DeserializeOwned>(collection: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| BookverseError::InvalidData(format!("Malformed document in {}: {}", collection, e)))
}

fn decode_all<T: DeserializeOwned>(collection: &str, values: Vec<Value>) -> Result<Vec<T>> {
    values.into_iter().map(|v| decode(collection, v)).collect()
}

fn require_text(collection: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BookverseError::ConstraintViolation(format!(
            "{}.{} is required",
            collection, field
        )));
    }
    Ok(())
}

async fn require_user(tx: &mut DocumentTransaction, user_id: &str, referenced_from: &str) -> Result<()> {
    if tx.find_by_id(USERS, user_id).await?.is_none() {
        return Err(BookverseError::ForeignKeyViolation(format!(
            "{} references missing user {}",
            referenced_from, user_id
        )));
    }
    Ok(())
}

/// BookVerse data access over an initialized `DocumentStore`
#[derive(Debug, Clone)]
pub struct Repository {
    store: DocumentStore,
}

impl Repository {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    // ========================================================================
    // USERS
    // ========================================================================

    /// Create an account. Emails are stored trimmed and lowercased.
    ///
    /// # Errors
    /// `UniqueViolation` if the email is already registered.
    pub async fn create_user(&self, user: &NewUser) -> Result<UserDoc> {
        require_text(USERS, "name", &user.name)?;
        require_text(USERS, "email", &user.email)?;

        let doc = UserDoc {
            id: new_id(),
            name: user.name.clone(),
            email: normalize_email(&user.email),
            password_hash: user.password_hash.clone(),
            role: user.role,
            phone: user.phone.clone(),
            profile_image: user.profile_image.clone(),
            created_at: now(),
        };
        self.store.insert_one(USERS, serde_json::to_value(&doc)?).await?;

        tracing::info!(user_id = %doc.id, role = doc.role.as_str(), "user created");
        Ok(doc)
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<UserDoc>> {
        self.store
            .find_by_id(USERS, user_id)
            .await?
            .map(|v| decode(USERS, v))
            .transpose()
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDoc>> {
        self.store
            .find_one(USERS, &Filter::new().eq("email", normalize_email(email)))
            .await?
            .map(|v| decode(USERS, v))
            .transpose()
    }

    /// Accounts with role `user`, newest first
    pub async fn list_users(&self, limit: u32) -> Result<Vec<UserDoc>> {
        let docs = self
            .store
            .find(
                USERS,
                &Filter::new().eq("role", UserRole::User.as_str()),
                &FindOptions::new().sort_desc("createdAt").limit(limit),
            )
            .await?;
        decode_all(USERS, docs)
    }

    /// Change profile fields and return the updated account
    ///
    /// # Errors
    /// - `RecordNotFound` if the user does not exist
    /// - `UniqueViolation` if the new email belongs to another account
    /// - `ConstraintViolation` if `name` or `email` is blank
    pub async fn update_user_profile(&self, user_id: &str, update: &UserProfileUpdate) -> Result<UserDoc> {
        let mut patch = serde_json::Map::new();
        if let Some(name) = &update.name {
            require_text(USERS, "name", name)?;
            patch.insert("name".to_string(), json!(name));
        }
        if let Some(email) = &update.email {
            require_text(USERS, "email", email)?;
            patch.insert("email".to_string(), json!(normalize_email(email)));
        }
        if let Some(phone) = &update.phone {
            patch.insert("phone".to_string(), json!(phone));
        }
        if let Some(profile_image) = &update.profile_image {
            patch.insert("profileImage".to_string(), json!(profile_image));
        }

        let mut tx = self.store.begin().await?;
        if !tx.update_one(USERS, user_id, Value::Object(patch)).await? {
            return Err(BookverseError::not_found(format!("user {}", user_id)));
        }
        let doc = tx
            .find_by_id(USERS, user_id)
            .await?
            .ok_or_else(|| BookverseError::not_found(format!("user {}", user_id)))?;
        tx.commit().await?;

        tracing::info!(user_id, "user profile updated");
        decode(USERS, doc)
    }

    /// Delete an account and its notifications
    ///
    /// Returns false if the user does not exist. Download events stay, since
    /// the `downloads` collection is append-only.
    ///
    /// # Errors
    /// `ForeignKeyViolation` while the user still owns books.
    pub async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        if tx.find_by_id(USERS, user_id).await?.is_none() {
            return Ok(false);
        }

        let owned = tx.count(BOOKS, &Filter::new().eq("uploadedBy", user_id)).await?;
        if owned > 0 {
            return Err(BookverseError::ForeignKeyViolation(format!(
                "user {} still owns {} book(s) via books.uploadedBy",
                user_id, owned
            )));
        }

        let notifications = tx
            .delete_many(NOTIFICATIONS, &Filter::new().eq("userId", user_id))
            .await?;
        tx.delete_one(USERS, user_id).await?;
        tx.commit().await?;

        tracing::info!(user_id, notifications, "user deleted");
        Ok(true)
    }

    // ========================================================================
    // BOOKS
    // ========================================================================

    /// Store an uploaded book as `pending` with zero downloads
    ///
    /// # Errors
    /// `ForeignKeyViolation` if `uploaded_by` is not an existing user.
    pub async fn create_book(&self, book: &NewBookDoc) -> Result<BookDoc> {
        require_text(BOOKS, "title", &book.title)?;
        require_text(BOOKS, "author", &book.author)?;

        let doc = BookDoc {
            id: new_id(),
            title: book.title.clone(),
            author: book.author.clone(),
            description: book.description.clone(),
            category: book.category.clone(),
            download_links: book.download_links.clone(),
            uploaded_file: book.uploaded_file.clone(),
            cover_url: book.cover_url.clone(),
            uploaded_by: book.uploaded_by.clone(),
            downloads: 0,
            status: BookStatus::Pending,
            created_at: now(),
        };

        let mut tx = self.store.begin().await?;
        require_user(&mut tx, &doc.uploaded_by, "books.uploadedBy").await?;
        tx.insert_one(BOOKS, serde_json::to_value(&doc)?).await?;
        tx.commit().await?;

        tracing::info!(book_id = %doc.id, uploaded_by = %doc.uploaded_by, "book submitted");
        Ok(doc)
    }

    pub async fn find_book(&self, book_id: &str) -> Result<Option<BookDoc>> {
        self.store
            .find_by_id(BOOKS, book_id)
            .await?
            .map(|v| decode(BOOKS, v))
            .transpose()
    }

    /// Apply a moderation decision to a pending book
    ///
    /// The `status = pending` guard is part of the update filter, so two
    /// concurrent moderators cannot both succeed.
    pub async fn moderate_book(&self, book_id: &str, status: BookStatus) -> Result<BookDoc> {
        let changed = if BookStatus::Pending.can_transition_to(status) {
            self.store
                .update_many(
                    BOOKS,
                    &Filter::new()
                        .eq("_id", book_id)
                        .eq("status", BookStatus::Pending.as_str()),
                    json!({ "status": status }),
                )
                .await?
        } else {
            0
        };

        let book = self
            .find_book(book_id)
            .await?
            .ok_or_else(|| BookverseError::not_found(format!("book {}", book_id)))?;

        if changed == 0 {
            return Err(BookverseError::InvalidTransition {
                book_id: book_id.to_string(),
                from: book.status.to_string(),
                to: status.to_string(),
            });
        }

        tracing::info!(book_id, status = %status, "book moderated");
        Ok(book)
    }

    /// Books in any status, newest first
    pub async fn list_books(&self, limit: u32) -> Result<Vec<BookDoc>> {
        let docs = self
            .store
            .find(BOOKS, &Filter::new(), &FindOptions::new().sort_desc("createdAt").limit(limit))
            .await?;
        decode_all(BOOKS, docs)
    }

    /// Remove a book. Returns false if it does not exist.
    ///
    /// Its download events are kept.
    pub async fn delete_book(&self, book_id: &str) -> Result<bool> {
        let deleted = self.store.delete_one(BOOKS, book_id).await?;
        if deleted {
            tracing::info!(book_id, "book deleted");
        }
        Ok(deleted)
    }

    /// Books in `status`, newest first
    pub async fn list_books_by_status(&self, status: BookStatus, limit: u32) -> Result<Vec<BookDoc>> {
        let docs = self
            .store
            .find(
                BOOKS,
                &Filter::new().eq("status", status.as_str()),
                &FindOptions::new().sort_desc("createdAt").limit(limit),
            )
            .await?;
        decode_all(BOOKS, docs)
    }

    pub async fn list_books_by_uploader(&self, user_id: &str) -> Result<Vec<BookDoc>> {
        let docs = self
            .store
            .find(
                BOOKS,
                &Filter::new().eq("uploadedBy", user_id),
                &FindOptions::new().sort_desc("createdAt"),
            )
            .await?;
        decode_all(BOOKS, docs)
    }

    /// Approved books whose title or author contains `query` (any case),
    /// optionally restricted to one category, newest first
    ///
    /// A blank query matches every approved book.
    pub async fn search_books(&self, query: &str, category: Option<&str>) -> Result<Vec<BookDoc>> {
        let mut filter = Filter::new().eq("status", BookStatus::Approved.as_str());
        let query = query.trim();
        if !query.is_empty() {
            filter = filter.contains_any(&["title", "author"], query);
        }
        if let Some(category) = category.filter(|c| !c.is_empty()) {
            filter = filter.eq("category", category);
        }

        let docs = self
            .store
            .find(BOOKS, &filter, &FindOptions::new().sort_desc("createdAt"))
            .await?;
        decode_all(BOOKS, docs)
    }

    // ========================================================================
    // DOWNLOADS
    // ========================================================================

    /// Record that `user_id` downloaded `book_id` and bump the book's counter
    ///
    /// # Errors
    /// `ForeignKeyViolation` if either the user or the book does not exist.
    pub async fn record_download(&self, book_id: &str, user_id: &str) -> Result<DownloadDoc> {
        let doc = DownloadDoc {
            id: new_id(),
            book_id: book_id.to_string(),
            user_id: user_id.to_string(),
            downloaded_at: now(),
        };

        let mut tx = self.store.begin().await?;
        require_user(&mut tx, user_id, "downloads.userId").await?;

        let downloads = tx
            .increment(BOOKS, book_id, "downloads", 1)
            .await?
            .ok_or_else(|| {
                BookverseError::ForeignKeyViolation(format!(
                    "downloads.bookId references missing book {}",
                    book_id
                ))
            })?;

        tx.insert_one(DOWNLOADS, serde_json::to_value(&doc)?).await?;
        tx.commit().await?;

        tracing::debug!(book_id, user_id, downloads, "download recorded");
        Ok(doc)
    }

    /// Downloads by one user, most recent first
    pub async fn download_history(&self, user_id: &str, limit: u32) -> Result<Vec<DownloadDoc>> {
        let docs = self
            .store
            .find(
                DOWNLOADS,
                &Filter::new().eq("userId", user_id),
                &FindOptions::new().sort_desc("downloadedAt").limit(limit),
            )
            .await?;
        decode_all(DOWNLOADS, docs)
    }

    pub async fn count_downloads_for_book(&self, book_id: &str) -> Result<u64> {
        self.store
            .count(DOWNLOADS, &Filter::new().eq("bookId", book_id))
            .await
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    pub async fn create_notification(&self, user_id: &str, title: &str, message: &str) -> Result<NotificationDoc> {
        require_text(NOTIFICATIONS, "title", title)?;

        let doc = NotificationDoc {
            id: new_id(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            read: false,
            created_at: now(),
        };

        let mut tx = self.store.begin().await?;
        require_user(&mut tx, user_id, "notifications.userId").await?;
        tx.insert_one(NOTIFICATIONS, serde_json::to_value(&doc)?).await?;
        tx.commit().await?;

        tracing::debug!(notification_id = %doc.id, user_id, "notification created");
        Ok(doc)
    }

    /// Returns false if the notification does not exist
    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<bool> {
        self.store
            .update_one(NOTIFICATIONS, notification_id, json!({ "read": true }))
            .await
    }

    /// Mark every unread notification of a user as read; returns how many changed
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        self.store
            .update_many(
                NOTIFICATIONS,
                &Filter::new().eq("userId", user_id).eq("read", false),
                json!({ "read": true }),
            )
            .await
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<u64> {
        self.store
            .count(NOTIFICATIONS, &Filter::new().eq("userId", user_id).eq("read", false))
            .await
    }

    /// Notifications of a user, newest first
    pub async fn list_notifications(&self, user_id: &str, limit: u32) -> Result<Vec<NotificationDoc>> {
        let docs = self
            .store
            .find(
                NOTIFICATIONS,
                &Filter::new().eq("userId", user_id),
                &FindOptions::new().sort_desc("createdAt").limit(limit),
            )
            .await?;
        decode_all(NOTIFICATIONS, docs)
    }

    // ========================================================================
    // ADMIN
    // ========================================================================

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        Ok(DashboardStats {
            total_users: self
                .store
                .count(USERS, &Filter::new().eq("role", UserRole::User.as_str()))
                .await?,
            total_books: self.store.count(BOOKS, &Filter::new()).await?,
            pending_books: self
                .store
                .count(BOOKS, &Filter::new().eq("status", BookStatus::Pending.as_str()))
                .await?,
            total_downloads: self.store.sum(BOOKS, &Filter::new(), "downloads").await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::initializer::initialize;
    use std::time::Duration;

    async fn setup() -> Repository {
        let store = DocumentStore::open_in_memory().await.expect("Failed to open store");
        initialize(&store).await.expect("Failed to initialize store");
        Repository::new(store)
    }

    fn new_user(email: &str) -> NewUser {
        NewUser::new("Reader".to_string(), email.to_string(), "$2a$10$hash".to_string())
    }

    // Timestamps have millisecond precision
    async fn tick() {
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = setup().await;

        repo.create_user(&new_user("ana@example.com")).await.unwrap();
        repo.create_user(&new_user("bia@example.com")).await.unwrap();

        let err = repo.create_user(&new_user(" ANA@example.com ")).await.unwrap_err();
        assert!(matches!(err, BookverseError::UniqueViolation(_)), "got {:?}", err);

        let found = repo.find_user_by_email("Ana@Example.com").await.unwrap().unwrap();
        assert_eq!(found.email, "ana@example.com");
        assert_eq!(found.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_create_book_defaults_and_reference() {
        let repo = setup().await;
        let user = repo.create_user(&new_user("up@example.com")).await.unwrap();

        let book = repo
            .create_book(&NewBookDoc::new("O Cortiço", "Aluísio Azevedo", &user.id).with_category("romance"))
            .await
            .unwrap();
        assert_eq!(book.status, BookStatus::Pending);
        assert_eq!(book.downloads, 0);
        assert_eq!(repo.find_book(&book.id).await.unwrap().unwrap(), book);

        let err = repo
            .create_book(&NewBookDoc::new("Orphan", "Nobody", "no-such-user"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookverseError::ForeignKeyViolation(_)));
        assert_eq!(repo.store().count(BOOKS, &Filter::new()).await.unwrap(), 1);

        let err = repo.create_book(&NewBookDoc::new(" ", "A", &user.id)).await.unwrap_err();
        assert!(matches!(err, BookverseError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_moderation_is_one_way() {
        let repo = setup().await;
        let user = repo.create_user(&new_user("mod@example.com")).await.unwrap();
        let book = repo.create_book(&NewBookDoc::new("T", "A", &user.id)).await.unwrap();

        let approved = repo.moderate_book(&book.id, BookStatus::Approved).await.unwrap();
        assert_eq!(approved.status, BookStatus::Approved);

        let err = repo.moderate_book(&book.id, BookStatus::Rejected).await.unwrap_err();
        assert!(matches!(
            err,
            BookverseError::InvalidTransition { ref from, ref to, .. } if from == "approved" && to == "rejected"
        ));

        let other = repo.create_book(&NewBookDoc::new("T2", "A", &user.id)).await.unwrap();
        let err = repo.moderate_book(&other.id, BookStatus::Pending).await.unwrap_err();
        assert!(matches!(err, BookverseError::InvalidTransition { .. }));

        let err = repo.moderate_book("missing", BookStatus::Approved).await.unwrap_err();
        assert!(matches!(err, BookverseError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_approved_feed_is_newest_first() {
        let repo = setup().await;
        let user = repo.create_user(&new_user("feed@example.com")).await.unwrap();

        for i in 0..5 {
            let book = repo
                .create_book(&NewBookDoc::new(&format!("Book {}", i), "A", &user.id))
                .await
                .unwrap();
            if i != 2 {
                repo.moderate_book(&book.id, BookStatus::Approved).await.unwrap();
            }
            tick().await;
        }

        let feed = repo.list_books_by_status(BookStatus::Approved, 10).await.unwrap();
        assert_eq!(feed.len(), 4);
        assert!(feed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(feed[0].title, "Book 4");

        let pending = repo.list_books_by_status(BookStatus::Pending, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "Book 2");
    }

    #[tokio::test]
    async fn test_search_books() {
        let repo = setup().await;
        let user = repo.create_user(&new_user("s@example.com")).await.unwrap();

        for (title, author, category, approve) in [
            ("Dom Casmurro", "Machado de Assis", "romance", true),
            ("Quincas Borba", "Machado de Assis", "romance", true),
            ("Os Sertões", "Euclides da Cunha", "historia", true),
            ("Helena", "Machado de Assis", "romance", false),
        ] {
            let book = repo
                .create_book(&NewBookDoc::new(title, author, &user.id).with_category(category))
                .await
                .unwrap();
            if approve {
                repo.moderate_book(&book.id, BookStatus::Approved).await.unwrap();
            }
            tick().await;
        }

        let found = repo.search_books("machado", None).await.unwrap();
        let titles: Vec<&str> = found.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Quincas Borba", "Dom Casmurro"]);

        let found = repo.search_books("", Some("historia")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Os Sertões");

        assert!(repo.search_books("casmurro", Some("historia")).await.unwrap().is_empty());
        assert_eq!(repo.search_books("  ", None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_record_download() {
        let repo = setup().await;
        let uploader = repo.create_user(&new_user("u@example.com")).await.unwrap();
        let reader = repo.create_user(&new_user("r@example.com")).await.unwrap();
        let book = repo.create_book(&NewBookDoc::new("T", "A", &uploader.id)).await.unwrap();

        let first = repo.record_download(&book.id, &reader.id).await.unwrap();
        tick().await;
        let second = repo.record_download(&book.id, &reader.id).await.unwrap();

        assert_eq!(repo.find_book(&book.id).await.unwrap().unwrap().downloads, 2);
        assert_eq!(repo.count_downloads_for_book(&book.id).await.unwrap(), 2);

        let history = repo.download_history(&reader.id, 10).await.unwrap();
        assert_eq!(history, vec![second.clone(), first.clone()]);

        // Download events cannot be changed afterwards
        let err = repo
            .store()
            .update_one(DOWNLOADS, &first.id, json!({ "userId": uploader.id }))
            .await
            .unwrap_err();
        assert!(matches!(err, BookverseError::ImmutableRecord(_)));
        let err = repo.store().delete_one(DOWNLOADS, &first.id).await.unwrap_err();
        assert!(matches!(err, BookverseError::ImmutableRecord(_)));
    }

    #[tokio::test]
    async fn test_record_download_missing_refs_rolls_back() {
        let repo = setup().await;
        let user = repo.create_user(&new_user("x@example.com")).await.unwrap();
        let book = repo.create_book(&NewBookDoc::new("T", "A", &user.id)).await.unwrap();

        let err = repo.record_download("missing", &user.id).await.unwrap_err();
        assert!(matches!(err, BookverseError::ForeignKeyViolation(_)));

        let err = repo.record_download(&book.id, "missing").await.unwrap_err();
        assert!(matches!(err, BookverseError::ForeignKeyViolation(_)));

        assert_eq!(repo.find_book(&book.id).await.unwrap().unwrap().downloads, 0);
        assert_eq!(repo.store().count(DOWNLOADS, &Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notifications() {
        let repo = setup().await;
        let user = repo.create_user(&new_user("n@example.com")).await.unwrap();
        let other = repo.create_user(&new_user("o@example.com")).await.unwrap();

        let first = repo.create_notification(&user.id, "Aprovado", "Seu livro foi aprovado").await.unwrap();
        tick().await;
        repo.create_notification(&user.id, "Novo livro", "Confira").await.unwrap();
        tick().await;
        repo.create_notification(&user.id, "Aviso", "Manutenção").await.unwrap();
        repo.create_notification(&other.id, "Olá", "Bem-vindo").await.unwrap();

        assert_eq!(repo.unread_count(&user.id).await.unwrap(), 3);
        assert!(repo.mark_notification_read(&first.id).await.unwrap());
        assert!(!repo.mark_notification_read("missing").await.unwrap());
        assert_eq!(repo.unread_count(&user.id).await.unwrap(), 2);

        let list = repo.list_notifications(&user.id, 10).await.unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].title, "Aviso");
        assert!(list[2].read);

        assert_eq!(repo.mark_all_read(&user.id).await.unwrap(), 2);
        assert_eq!(repo.unread_count(&user.id).await.unwrap(), 0);
        assert_eq!(repo.unread_count(&other.id).await.unwrap(), 1);

        let err = repo.create_notification("missing", "T", "M").await.unwrap_err();
        assert!(matches!(err, BookverseError::ForeignKeyViolation(_)));
    }

    #[tokio::test]
    async fn test_dashboard_stats() {
        let repo = setup().await;
        assert_eq!(repo.dashboard_stats().await.unwrap(), DashboardStats::default());

        let admin = repo
            .create_user(&NewUser::admin("Admin".into(), "admin@example.com".into(), "h".into()))
            .await
            .unwrap();
        let reader = repo.create_user(&new_user("reader@example.com")).await.unwrap();

        let a = repo.create_book(&NewBookDoc::new("A", "X", &admin.id)).await.unwrap();
        repo.create_book(&NewBookDoc::new("B", "X", &admin.id)).await.unwrap();
        repo.moderate_book(&a.id, BookStatus::Approved).await.unwrap();
        repo.record_download(&a.id, &reader.id).await.unwrap();
        repo.record_download(&a.id, &admin.id).await.unwrap();

        assert_eq!(
            repo.dashboard_stats().await.unwrap(),
            DashboardStats {
                total_users: 1,
                total_books: 2,
                pending_books: 1,
                total_downloads: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_find_user_by_id() {
        let repo = setup().await;
        let user = repo.create_user(&new_user(" Rita@Example.com")).await.unwrap();

        let found = repo.find_user(&user.id).await.unwrap().unwrap();
        assert_eq!(found, user);
        assert_eq!(found.email, "rita@example.com");
        assert!(!found.is_admin());
        assert!(repo.find_user("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_users_excludes_admins() {
        let repo = setup().await;
        repo.create_user(&NewUser::admin("Admin".into(), "admin@example.com".into(), "h".into()))
            .await
            .unwrap();
        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            repo.create_user(&new_user(email)).await.unwrap();
            tick().await;
        }

        let emails: Vec<String> = repo
            .list_users(10)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.email)
            .collect();
        assert_eq!(emails, vec!["c@example.com", "b@example.com", "a@example.com"]);
        assert_eq!(repo.list_users(2).await.unwrap().len(), 2);
        assert!(repo.list_users(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_user_profile() {
        let repo = setup().await;
        let user = repo.create_user(&new_user("old@example.com")).await.unwrap();
        repo.create_user(&new_user("taken@example.com")).await.unwrap();

        let updated = repo
            .update_user_profile(
                &user.id,
                &UserProfileUpdate {
                    name: Some("Rita Lee".into()),
                    email: Some(" New@Example.com ".into()),
                    phone: Some("+55 11 5555-0000".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Rita Lee");
        assert_eq!(updated.email, "new@example.com");
        assert_eq!(updated.phone.as_deref(), Some("+55 11 5555-0000"));
        assert_eq!(updated.profile_image, None);
        assert_eq!(updated.password_hash, user.password_hash);
        assert_eq!(updated.created_at, user.created_at);
        assert!(repo.find_user_by_email("old@example.com").await.unwrap().is_none());

        let err = repo
            .update_user_profile(
                &user.id,
                &UserProfileUpdate {
                    email: Some("TAKEN@example.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookverseError::UniqueViolation(_)), "got {:?}", err);
        assert_eq!(repo.find_user(&user.id).await.unwrap().unwrap().email, "new@example.com");

        let err = repo
            .update_user_profile(
                &user.id,
                &UserProfileUpdate {
                    name: Some("  ".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookverseError::ConstraintViolation(_)));

        let err = repo
            .update_user_profile("missing", &UserProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BookverseError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_user_requires_no_books() {
        let repo = setup().await;
        let owner = repo.create_user(&new_user("owner@example.com")).await.unwrap();
        let reader = repo.create_user(&new_user("reader@example.com")).await.unwrap();
        let book = repo.create_book(&NewBookDoc::new("T", "A", &owner.id)).await.unwrap();
        repo.record_download(&book.id, &reader.id).await.unwrap();
        repo.create_notification(&reader.id, "Oi", "M").await.unwrap();
        repo.create_notification(&owner.id, "Oi", "M").await.unwrap();

        let err = repo.delete_user(&owner.id).await.unwrap_err();
        assert!(matches!(err, BookverseError::ForeignKeyViolation(_)));
        assert!(repo.find_user(&owner.id).await.unwrap().is_some());
        assert_eq!(repo.unread_count(&owner.id).await.unwrap(), 1);

        assert!(repo.delete_user(&reader.id).await.unwrap());
        assert!(repo.find_user(&reader.id).await.unwrap().is_none());
        assert_eq!(repo.unread_count(&reader.id).await.unwrap(), 0);
        assert_eq!(repo.count_downloads_for_book(&book.id).await.unwrap(), 1);
        assert!(!repo.delete_user(&reader.id).await.unwrap());

        // The email is free again
        repo.create_user(&new_user("reader@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_book_and_list_all() {
        let repo = setup().await;
        let user = repo.create_user(&new_user("del@example.com")).await.unwrap();

        let mut ids = Vec::new();
        for title in ["A", "B", "C"] {
            ids.push(repo.create_book(&NewBookDoc::new(title, "X", &user.id)).await.unwrap().id);
            tick().await;
        }
        repo.moderate_book(&ids[0], BookStatus::Approved).await.unwrap();
        repo.moderate_book(&ids[1], BookStatus::Rejected).await.unwrap();
        repo.record_download(&ids[0], &user.id).await.unwrap();

        let titles: Vec<String> = repo.list_books(10).await.unwrap().into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["C", "B", "A"]);

        assert!(repo.delete_book(&ids[0]).await.unwrap());
        assert!(!repo.delete_book(&ids[0]).await.unwrap());
        assert!(repo.find_book(&ids[0]).await.unwrap().is_none());
        assert_eq!(repo.list_books(10).await.unwrap().len(), 2);
        assert_eq!(repo.count_downloads_for_book(&ids[0]).await.unwrap(), 1);

        // With its book gone the owner can be deleted once the rest go too
        repo.delete_book(&ids[1]).await.unwrap();
        repo.delete_book(&ids[2]).await.unwrap();
        assert!(repo.delete_user(&user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_books_by_uploader_newest_first() {
        let repo = setup().await;
        let owner = repo.create_user(&new_user("owner@example.com")).await.unwrap();
        let other = repo.create_user(&new_user("other@example.com")).await.unwrap();

        for (title, uploader) in [("A", &owner), ("B", &other), ("C", &owner), ("D", &owner)] {
            let book = repo.create_book(&NewBookDoc::new(title, "X", &uploader.id)).await.unwrap();
            if title == "C" {
                repo.moderate_book(&book.id, BookStatus::Approved).await.unwrap();
            }
            tick().await;
        }

        // Every status is listed
        let titles: Vec<String> = repo
            .list_books_by_uploader(&owner.id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["D", "C", "A"]);
        assert!(repo.list_books_by_uploader("missing").await.unwrap().is_empty());
    }
}
