// src/models/article.rs

//! Fetched article payloads and full-text formats.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::StudyMetadata;

/// Full-text representation of an article.
///
/// Variants are ordered by retrieval preference: full Elsevier XML first,
/// HTML next, plain text as a last resort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    Xml,
    Html,
    Plain,
}

impl ContentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::Xml => "xml",
            ContentFormat::Html => "html",
            ContentFormat::Plain => "plain",
        }
    }

    /// MIME type sent in the `Accept` header.
    pub fn accept_header(&self) -> &'static str {
        match self {
            ContentFormat::Xml => "application/xml",
            ContentFormat::Html => "text/html",
            ContentFormat::Plain => "text/plain",
        }
    }

    /// Value for the `httpAccept` query parameter the API expects.
    pub fn http_accept_param(&self) -> &'static str {
        match self {
            ContentFormat::Xml => "text/xml",
            ContentFormat::Html => "text/html",
            ContentFormat::Plain => "text/plain",
        }
    }

    /// File extension for on-disk copies.
    pub fn extension(&self) -> &'static str {
        match self {
            ContentFormat::Xml => "xml",
            ContentFormat::Html => "html",
            ContentFormat::Plain => "txt",
        }
    }
}

impl std::fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw article payload retrieved from the publisher API.
///
/// Immutable after construction; the extractor treats it as read-only input.
#[derive(Debug, Clone)]
pub struct ArticleContent {
    /// Identifiers copied from the study record
    pub study: StudyMetadata,

    /// Raw document bytes
    pub payload: Vec<u8>,

    /// Content-Type header as reported by the server (or cache default)
    pub content_type: String,

    /// Full-text format this payload was retrieved as
    pub format: ContentFormat,

    /// Retrieval timestamp
    pub retrieved_at: DateTime<Utc>,

    /// Whether the payload was served from the content cache
    pub from_cache: bool,

    /// Retrieval provenance: rate-limit snapshot, inferred PII, view flags
    pub metadata: BTreeMap<String, String>,
}

impl ArticleContent {
    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Best identifier for log messages and error records.
    pub fn identifier(&self) -> &str {
        self.study.identifier().unwrap_or("<unknown>")
    }
}
