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


//! Database query functions
//!
//! Repository functions for the relational backend, one group per table.
//!
//! # Query Patterns
//! - Free functions taking `&SqlitePool`
//! - Constraint failures come back as the matching `BookverseError` integrity
//!   variant through `?`; nothing here pre-checks what SQLite enforces
//! - Timestamps are never bound by callers

use crate::docstore::query::escape_like;
use crate::error::{BookverseError, Result};
use crate::storage::models::*;
use sqlx::SqlitePool;

// ============================================================================
// USER QUERIES
// ============================================================================

/// Insert a new user
///
/// Returns the id of the inserted user. Fails with `UniqueViolation` when the
/// email is already registered.
pub async fn insert_user(pool: &SqlitePool, user: &NewUser) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, phone, profile_image)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(&user.phone)
    .bind(&user.profile_image)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Find user by ID
pub async fn find_user_by_id(pool: &SqlitePool, user_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

/// Find user by email
pub async fn find_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

/// Find the first admin account, if any
pub async fn find_first_admin(pool: &SqlitePool) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE role = 'admin' ORDER BY created_at ASC, id ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Count users by role
pub async fn count_users_by_role(pool: &SqlitePool, role: UserRole) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
        .bind(role.as_str())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

// ============================================================================
// BOOK QUERIES
// ============================================================================

/// Insert a new book
///
/// Returns the id of the inserted book. When `book.status` is `None` the
/// column default applies and the book starts out `pending`.
///
/// # Errors
/// - `ForeignKeyViolation` if `added_by` is not an existing user id
/// - `ConstraintViolation` if a required column is missing
pub async fn insert_book(pool: &SqlitePool, book: &NewBook) -> Result<i64> {
    let query = match book.status {
        Some(status) => sqlx::query(
            r#"
            INSERT INTO books (
                title, author, description, category, file_url, cover_url, added_by, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.category)
        .bind(&book.file_url)
        .bind(&book.cover_url)
        .bind(book.added_by)
        .bind(status.as_str()),
        None => sqlx::query(
            r#"
            INSERT INTO books (
                title, author, description, category, file_url, cover_url, added_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.category)
        .bind(&book.file_url)
        .bind(&book.cover_url)
        .bind(book.added_by),
    };

    let result = query.execute(pool).await?;
    tracing::debug!(book_id = result.last_insert_rowid(), added_by = book.added_by, "inserted book");

    Ok(result.last_insert_rowid())
}

/// Find book by ID
pub async fn find_book_by_id(pool: &SqlitePool, book_id: i64) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = ?")
        .bind(book_id)
        .fetch_optional(pool)
        .await?;

    Ok(book)
}

/// Update the descriptive fields of an existing book
///
/// Status, counters, ownership and timestamps are not touched here.
pub async fn update_book(pool: &SqlitePool, book: &Book) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE books SET
            title = ?, author = ?, description = ?, category = ?,
            file_url = ?, cover_url = ?
        WHERE id = ?
        "#,
    )
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.description)
    .bind(&book.category)
    .bind(&book.file_url)
    .bind(&book.cover_url)
    .bind(book.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(BookverseError::not_found(format!("book {}", book.id)));
    }

    Ok(())
}

/// Apply a moderation decision
///
/// Only `pending → approved` and `pending → rejected` are accepted. The
/// `status = 'pending'` guard lives in the UPDATE itself.
pub async fn set_book_status(pool: &SqlitePool, book_id: i64, status: BookStatus) -> Result<Book> {
    if !BookStatus::Pending.can_transition_to(status) {
        return Err(BookverseError::InvalidTransition {
            book_id: book_id.to_string(),
            from: BookStatus::Pending.to_string(),
            to: status.to_string(),
        });
    }

    let result = sqlx::query("UPDATE books SET status = ? WHERE id = ? AND status = 'pending'")
        .bind(status.as_str())
        .bind(book_id)
        .execute(pool)
        .await?;

    let book = find_book_by_id(pool, book_id)
        .await?
        .ok_or_else(|| BookverseError::not_found(format!("book {}", book_id)))?;

    if result.rows_affected() == 0 {
        return Err(BookverseError::InvalidTransition {
            book_id: book_id.to_string(),
            from: book.status.clone(),
            to: status.to_string(),
        });
    }

    tracing::info!(book_id, status = %status, "book moderated");
    Ok(book)
}

/// Increment the download counter of a book
///
/// Returns the new counter value.
pub async fn increment_downloads(pool: &SqlitePool, book_id: i64) -> Result<i64> {
    let downloads: Option<i64> =
        sqlx::query_scalar("UPDATE books SET downloads = downloads + 1 WHERE id = ? RETURNING downloads")
            .bind(book_id)
            .fetch_optional(pool)
            .await?;

    downloads.ok_or_else(|| BookverseError::not_found(format!("book {}", book_id)))
}

/// List books in a moderation state, newest first
///
/// Served by `idx_books_status_created_at`. Ties on `created_at` fall back to
/// insertion order.
pub async fn list_books_by_status(
    pool: &SqlitePool,
    status: BookStatus,
    limit: u32,
    offset: u32,
) -> Result<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>(
        "SELECT * FROM books WHERE status = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(status.as_str())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(books)
}

/// List books uploaded by one user, newest first
pub async fn list_books_by_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>(
        "SELECT * FROM books WHERE added_by = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(books)
}

/// Search approved books by title or author (case-insensitive substring)
///
/// `%` and `_` in `query` match themselves.
pub async fn search_books(pool: &SqlitePool, query: &str, limit: u32) -> Result<Vec<Book>> {
    let search_pattern = format!("%{}%", escape_like(query));

    let books = sqlx::query_as::<_, Book>(
        r#"
        SELECT * FROM books
        WHERE status = 'approved' AND (title LIKE ? ESCAPE '\' OR author LIKE ? ESCAPE '\')
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(&search_pattern)
    .bind(&search_pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(books)
}

/// Count books in a moderation state
pub async fn count_books_by_status(pool: &SqlitePool, status: BookStatus) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Delete a book
pub async fn delete_book(pool: &SqlitePool, book_id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(book_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(BookverseError::not_found(format!("book {}", book_id)));
    }

    Ok(())
}
