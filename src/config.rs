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


//! Store locations
//!
//! Both stores are SQLite files. A location is either a plain path or a
//! `sqlite://` URL (`sqlite:///var/lib/bookverse/books.db`).

use crate::error::{BookverseError, Result};
use crate::storage::database::{default_data_dir, Database};
use std::path::PathBuf;
use url::Url;

/// Environment variable overriding the relational database location
pub const DATABASE_ENV: &str = "BOOKVERSE_DB";
/// Environment variable overriding the document store location
pub const DOCUMENT_ENV: &str = "BOOKVERSE_DOCS";

const DOCUMENT_FILE: &str = "bookverse-docs.db";

/// Where the two stores live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub document_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: Database::get_default_path(),
            document_path: default_data_dir().join(DOCUMENT_FILE),
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `BOOKVERSE_DB` / `BOOKVERSE_DOCS` when set
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(location) = lookup(DATABASE_ENV).filter(|v| !v.is_empty()) {
            config.database_path = parse_location(&location)?;
        }
        if let Some(location) = lookup(DOCUMENT_ENV).filter(|v| !v.is_empty()) {
            config.document_path = parse_location(&location)?;
        }
        Ok(config)
    }

    pub fn with_database_path(mut self, location: &str) -> Result<Self> {
        self.database_path = parse_location(location)?;
        Ok(self)
    }

    pub fn with_document_path(mut self, location: &str) -> Result<Self> {
        self.document_path = parse_location(location)?;
        Ok(self)
    }
}

/// Resolve a plain path or `sqlite://` URL to a file path
pub fn parse_location(location: &str) -> Result<PathBuf> {
    if !location.contains("://") {
        return Ok(PathBuf::from(location));
    }

    let url = Url::parse(location)?;
    if url.scheme() != "sqlite" {
        return Err(BookverseError::ConfigurationError(format!(
            "Unsupported store scheme '{}' in {}",
            url.scheme(),
            redact_connection_string(location)
        )));
    }

    // sqlite://relative/path puts the first segment in the host
    let path = match url.host_str() {
        Some(host) if !host.is_empty() => format!("{}{}", host, url.path()),
        _ => url.path().to_string(),
    };
    if path.is_empty() || path == "/" {
        return Err(BookverseError::ConfigurationError(format!(
            "No file path in {}",
            redact_connection_string(location)
        )));
    }
    Ok(PathBuf::from(path))
}

/// Mask the password of a connection URL before it is logged
///
/// Strings that do not parse as URLs are returned unchanged.
pub fn redact_connection_string(location: &str) -> String {
    match Url::parse(location) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_err() {
                return "<redacted>".to_string();
            }
            url.to_string()
        }
        _ => location.to_string(),
    }
}
