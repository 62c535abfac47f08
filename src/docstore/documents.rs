//! Typed documents stored in the BookVerse collections
//!
//! Field names are camelCase on disk (`uploadedBy`, `createdAt`) to match the
//! index declarations. Timestamps are stored as milliseconds since the epoch
//! so that index order equals time order.

use crate::storage::models::{BookStatus, UserRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account (`users` collection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl UserDoc {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// External link a book can be fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub url: String,
    pub format: String,
}

/// File stored by the upload handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub filename: String,
    pub original_name: String,
    pub path: String,
}

/// Book (`books` collection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub download_links: Vec<DownloadLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_file: Option<UploadedFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    pub uploaded_by: String, // users._id
    #[serde(default)]
    pub downloads: i64,
    #[serde(default)]
    pub status: BookStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// One download event (`downloads` collection, append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub downloaded_at: DateTime<Utc>,
}

/// Notification addressed to one user (`notifications` collection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Book as submitted by the upload handler
#[derive(Debug, Clone)]
pub struct NewBookDoc {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub download_links: Vec<DownloadLink>,
    pub uploaded_file: Option<UploadedFile>,
    pub cover_url: Option<String>,
    pub uploaded_by: String,
}

impl NewBookDoc {
    pub fn new(title: &str, author: &str, uploaded_by: &str) -> Self {
        Self {
            title: title.to_string(),
            author: author.to_string(),
            description: None,
            category: None,
            download_links: Vec::new(),
            uploaded_file: None,
            cover_url: None,
            uploaded_by: uploaded_by.to_string(),
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Profile fields a user may change; `None` leaves a field as it is
#[derive(Debug, Clone, Default)]
pub struct UserProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub profile_image: Option<String>,
}

/// Counters shown on the admin dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Accounts with role `user` (admins excluded)
    pub total_users: u64,
    pub total_books: u64,
    pub pending_books: u64,
    /// Sum of every book's download counter
    pub total_downloads: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_book_doc_layout() {
        let book = BookDoc {
            id: "b1".into(),
            title: "Memórias Póstumas".into(),
            author: "Machado de Assis".into(),
            description: None,
            category: Some("romance".into()),
            download_links: Vec::new(),
            uploaded_file: None,
            cover_url: None,
            uploaded_by: "u1".into(),
            downloads: 0,
            status: BookStatus::Pending,
            created_at: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        };

        let value = serde_json::to_value(&book).unwrap();
        assert_eq!(
            value,
            json!({
                "_id": "b1",
                "title": "Memórias Póstumas",
                "author": "Machado de Assis",
                "category": "romance",
                "uploadedBy": "u1",
                "downloads": 0,
                "status": "pending",
                "createdAt": 1_700_000_000_123i64,
            })
        );

        let back: BookDoc = serde_json::from_value(value).unwrap();
        assert_eq!(back, book);
    }

    #[test]
    fn test_defaults_on_sparse_documents() {
        let user: UserDoc = serde_json::from_value(json!({
            "_id": "u1",
            "name": "Ana",
            "email": "ana@example.com",
            "passwordHash": "x",
            "createdAt": 0,
        }))
        .unwrap();
        assert_eq!(user.role, UserRole::User);
        assert!(!user.is_admin());

        let err = serde_json::from_value::<BookDoc>(json!({
            "_id": "b1",
            "title": "T",
            "author": "A",
            "uploadedBy": "u1",
            "status": "archived",
            "createdAt": 0,
        }));
        assert!(err.is_err());
    }
}
