// src/services/download.rs

//! Download orchestrator.
//!
//! Resolves the best available full-text format per study, fanning out
//! cache-aware fetches over a bounded worker pool. Candidate formats for one
//! study are tried strictly in preference order; across studies the pool runs
//! concurrently and results are reassembled in input order.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use regex::bytes::Regex;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{ArticleContent, Config, ContentFormat, StudyMetadata};
use crate::services::client::{ApiIdentifier, FetchClient, RawResponse};
use crate::storage::{CacheNamespace, CachePolicy, ContentCache, cache_key};

/// Source of full-text payloads, one request per (study, format).
///
/// The production implementation wraps the fetch client; tests substitute
/// fakes to exercise fallback and concurrency behavior without a network.
#[async_trait]
pub trait FullTextSource: Send + Sync {
    async fn fetch_article(
        &self,
        study: &StudyMetadata,
        format: ContentFormat,
    ) -> Result<RawResponse>;
}

/// Fetches full text through the publisher content API.
///
/// When a study carries several identifiers, endpoints are tried in
/// doi > pmid > pii order; a permanent failure on one identifier falls
/// through to the next.
pub struct ApiFullTextSource {
    client: FetchClient,
}

impl ApiFullTextSource {
    pub fn new(client: FetchClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FullTextSource for ApiFullTextSource {
    async fn fetch_article(
        &self,
        study: &StudyMetadata,
        format: ContentFormat,
    ) -> Result<RawResponse> {
        let attempts = ApiIdentifier::candidates(study);
        if attempts.is_empty() {
            return Err(AppError::input("study carries no usable identifier"));
        }

        let mut last_error = None;
        for attempt in &attempts {
            match self.client.get_raw(&attempt.path(), &[], format).await {
                Ok(response) => return Ok(response),
                Err(e @ AppError::PermanentFetch { .. }) => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Err(AppError::input("study carries no usable identifier")),
        }
    }
}

/// One study that could not be downloaded.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadFailure {
    /// Position of the study in the input sequence
    pub index: usize,

    /// The study record that failed
    pub study: StudyMetadata,

    /// Human-readable failure description
    pub error: String,

    /// Error taxonomy kind ("rate_limit", "transient", "permanent", ...)
    pub kind: String,
}

impl DownloadFailure {
    pub fn from_error(index: usize, study: StudyMetadata, error: &AppError) -> Self {
        Self {
            index,
            study,
            kind: failure_kind(error).to_string(),
            error: error.to_string(),
        }
    }
}

/// Outcome of a batch download: every input study lands in exactly one of
/// the two lists, both ordered by input position.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub articles: Vec<ArticleContent>,
    pub failures: Vec<DownloadFailure>,
}

/// Batch download behavior.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Candidate formats in strict fallback order
    pub formats: Vec<ContentFormat>,

    /// Cache mode for this batch
    pub cache: CachePolicy,

    /// Abort the batch on the first unrecoverable failure
    pub fail_fast: bool,

    /// Worker pool bound
    pub concurrency: usize,
}

impl DownloadOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            formats: config.download.formats.clone(),
            cache: if config.download.use_cache {
                CachePolicy::Use
            } else {
                CachePolicy::Off
            },
            fail_fast: false,
            concurrency: config.download.max_concurrent,
        }
    }
}

/// Orchestrates cache-aware, bounded-concurrency article downloads.
pub struct DownloadOrchestrator {
    source: Arc<dyn FullTextSource>,
    cache: Option<Arc<dyn ContentCache>>,
    options: DownloadOptions,
}

impl DownloadOrchestrator {
    pub fn new(
        source: Arc<dyn FullTextSource>,
        cache: Option<Arc<dyn ContentCache>>,
        options: DownloadOptions,
    ) -> Self {
        Self {
            source,
            cache,
            options,
        }
    }

    /// Download all studies, preserving input order in the report.
    ///
    /// In continue-on-error mode every failed study becomes a failure
    /// record, rate-limit exhaustion included; only fail-fast mode aborts
    /// the batch.
    pub async fn download_all(&self, studies: &[StudyMetadata]) -> Result<DownloadReport> {
        let concurrency = self.options.concurrency.max(1);

        // `buffered` keeps output in input order while running up to
        // `concurrency` downloads at once.
        let mut jobs = stream::iter(studies.iter().cloned().enumerate())
            .map(|(index, study)| async move {
                let result = self.download_study(&study).await;
                (index, study, result)
            })
            .buffered(concurrency);

        let mut report = DownloadReport::default();
        while let Some((index, study, result)) = jobs.next().await {
            match result {
                Ok(article) => report.articles.push(article),
                Err(error) => {
                    if self.options.fail_fast {
                        return Err(error);
                    }
                    log::warn!(
                        "Download failed for {}: {}",
                        study.identifier().unwrap_or("<unknown>"),
                        error
                    );
                    report
                        .failures
                        .push(DownloadFailure::from_error(index, study, &error));
                }
            }
        }
        Ok(report)
    }

    /// Download one study, walking candidate formats in preference order.
    async fn download_study(&self, study: &StudyMetadata) -> Result<ArticleContent> {
        let identifier = study
            .identifier()
            .ok_or_else(|| AppError::input("study carries no usable identifier"))?;

        let mut last_error: Option<AppError> = None;
        for &format in &self.options.formats {
            match self.fetch_format(study, identifier, format).await {
                Ok(article) => return Ok(article),
                Err(e @ (AppError::PermanentFetch { .. } | AppError::Input(_))) => {
                    log::debug!("Format {format} unavailable for {identifier}: {e}");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::input(format!("no candidate formats for {identifier}"))))
    }

    /// Fetch one (study, format) candidate through the cache.
    async fn fetch_format(
        &self,
        study: &StudyMetadata,
        identifier: &str,
        format: ContentFormat,
    ) -> Result<ArticleContent> {
        let key = cache_key(&[&study.identity_key(), format.as_str()]);

        if self.options.cache.reads()
            && let Some(cache) = &self.cache
            && let Some(payload) = cache.get(CacheNamespace::Articles, &key).await?
        {
            log::debug!("Cache hit for {identifier} ({format})");
            return self.build_article(study, payload, format, None, true);
        }

        let response = self.source.fetch_article(study, format).await?;

        // A payload without body text is a metadata-only view; treat it as a
        // failed candidate rather than caching a useless document.
        if format == ContentFormat::Xml && !payload_has_full_text(&response.bytes) {
            return Err(AppError::permanent(
                200,
                format!(
                    "metadata-only payload for {identifier}; \
                     confirm your entitlements allow full-text retrieval"
                ),
            ));
        }

        if self.options.cache.writes()
            && let Some(cache) = &self.cache
        {
            let mut meta = BTreeMap::new();
            meta.insert("content_type".to_string(), response.content_type.clone());
            meta.insert("format".to_string(), format.as_str().to_string());
            cache
                .put(CacheNamespace::Articles, &key, &response.bytes, Some(&meta))
                .await?;
        }

        self.build_article(study, response.bytes.clone(), format, Some(&response), false)
    }

    fn build_article(
        &self,
        study: &StudyMetadata,
        payload: Vec<u8>,
        format: ContentFormat,
        response: Option<&RawResponse>,
        from_cache: bool,
    ) -> Result<ArticleContent> {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "transport".to_string(),
            if from_cache { "cache" } else { "network" }.to_string(),
        );
        metadata.insert("view_requested".to_string(), "FULL".to_string());

        if let Some(response) = response {
            response.snapshot.record_into(&mut metadata);
        }
        if let Some(pii) = extract_pii(&payload) {
            metadata.insert("pii".to_string(), pii);
        }
        if study.doi.is_none()
            && let Some(doi) = extract_doi(&payload)
        {
            metadata.insert("doi".to_string(), doi);
        }
        let attachments = extract_supplementary_links(&payload);
        if !attachments.is_empty() {
            metadata.insert(
                "supplementary_attachments".to_string(),
                serde_json::to_string(&attachments)?,
            );
        }

        let content_type = response
            .map(|r| r.content_type.clone())
            .unwrap_or_else(|| format.accept_header().to_string());

        Ok(ArticleContent {
            study: study.clone(),
            payload,
            content_type,
            format,
            retrieved_at: Utc::now(),
            from_cache,
            metadata,
        })
    }
}

fn failure_kind(error: &AppError) -> &'static str {
    match error {
        AppError::RateLimitExceeded { .. } => "rate_limit",
        AppError::TransientFetch { .. } => "transient",
        AppError::PermanentFetch { .. } => "permanent",
        AppError::MalformedDocument { .. } => "malformed",
        AppError::Input(_) => "input",
        _ => "other",
    }
}

/// Whether an XML payload carries article body text rather than metadata
/// alone: any body, section, paragraph or table element qualifies.
pub fn payload_has_full_text(payload: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(payload) else {
        return false;
    };
    let Ok(doc) = roxmltree::Document::parse(text) else {
        return false;
    };
    doc.descendants().any(|node| {
        matches!(
            node.tag_name().name(),
            "body" | "section" | "sections" | "para" | "simple-para" | "table"
        )
    })
}

/// First `<pii>` element text in the payload.
pub fn extract_pii(payload: &[u8]) -> Option<String> {
    let pattern = Regex::new(r"(?i)<pii[^>]*>([^<]+)</pii>").expect("static regex");
    let captures = pattern.captures(payload)?;
    std::str::from_utf8(captures.get(1)?.as_bytes())
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Supplementary material advertised by an article payload.
///
/// Attachments are served through the object retrieval endpoint; when the
/// object id carries an `eid` path segment the public CDN location can be
/// derived from it and the inferred file extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplementaryAttachment {
    #[serde(rename = "ref")]
    pub reference: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,

    /// Size attribute as reported, not validated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    pub api_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const CDN_BASE: &str = "https://ars.els-cdn.com/content/image";

/// Collect supplementary attachment links advertised in an XML payload.
///
/// `object` elements count as supplementary when the `ref` looks like
/// multimedia content (`mm*`, `*supp*`) or the type/category mark it as an
/// application attachment; downsampled figures and other inline objects are
/// skipped.
pub fn extract_supplementary_links(payload: &[u8]) -> Vec<SupplementaryAttachment> {
    let Ok(text) = std::str::from_utf8(payload) else {
        return Vec::new();
    };
    let Ok(doc) = roxmltree::Document::parse(text) else {
        return Vec::new();
    };

    let mut attachments = Vec::new();
    for obj in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "object")
    {
        let reference = obj.attribute("ref").map(str::trim).unwrap_or("");
        if reference.is_empty() {
            continue;
        }
        let kind = lowered_attr(obj, "type");
        let category = lowered_attr(obj, "category");
        if !is_supplementary(reference, &kind, &category) {
            continue;
        }

        let Some(api_url) = obj
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                obj.attribute((XLINK_NS, "href"))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            })
        else {
            continue;
        };

        let mimetype = lowered_attr(obj, "mimetype");
        let extension = infer_extension(api_url, &mimetype);
        let cdn_url = guess_cdn_url(api_url, extension.as_deref());

        attachments.push(SupplementaryAttachment {
            reference: reference.to_string(),
            kind: obj.attribute("type").map(String::from),
            category: obj.attribute("category").map(String::from),
            mimetype: Some(mimetype).filter(|s| !s.is_empty()),
            size: obj.attribute("size").map(String::from),
            api_url: api_url.to_string(),
            cdn_url,
            extension,
        });
    }
    attachments
}

fn lowered_attr(node: roxmltree::Node, name: &str) -> String {
    node.attribute(name)
        .map(|v| v.trim().to_lowercase())
        .unwrap_or_default()
}

fn is_supplementary(reference: &str, kind: &str, category: &str) -> bool {
    let reference = reference.to_lowercase();
    reference.starts_with("mm")
        || reference.contains("supp")
        || kind.contains("supp")
        || kind == "application"
        || category.contains("application")
}

/// File extension for an attachment: the mimetype map wins over the URL
/// filename, which covers objects served with a generic extension.
fn infer_extension(url: &str, mimetype: &str) -> Option<String> {
    let mapped = extension_for_mimetype(mimetype);
    let filename = url_path(url).rsplit('/').next().unwrap_or("");
    match (filename.rsplit_once('.'), mapped) {
        (_, Some(ext)) => Some(ext.to_string()),
        (Some((_, current)), None) => Some(current.to_lowercase()),
        (None, None) => None,
    }
}

fn extension_for_mimetype(mimetype: &str) -> Option<&'static str> {
    Some(match mimetype {
        "application/word" => "docx",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/pdf" => "pdf",
        "application/zip" | "application/x-zip-compressed" => "zip",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-powerpoint" => "ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        _ => return None,
    })
}

/// Public CDN location for an object URL carrying an `eid` path segment.
fn guess_cdn_url(api_url: &str, extension: Option<&str>) -> Option<String> {
    let path = url_path(api_url);
    let (_, filename) = path.split_once("/eid/")?;
    let filename = match extension {
        Some(ext) => match filename.rsplit_once('.') {
            Some((base, _)) => format!("{base}.{ext}"),
            None => format!("{filename}.{ext}"),
        },
        None => filename.to_string(),
    };
    Some(format!("{CDN_BASE}/{filename}"))
}

/// Path component of a URL-ish string, query and fragment stripped.
fn url_path(url: &str) -> &str {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    match trimmed.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or(""),
        None => trimmed,
    }
}

/// First DOI element text in the payload (`<doi>` or a namespaced variant).
pub fn extract_doi(payload: &[u8]) -> Option<String> {
    let pattern =
        Regex::new(r"(?i)<(?:\w+:)?doi[^>]*>([^<]+)</(?:\w+:)?doi>").expect("static regex");
    let captures = pattern.captures(payload)?;
    std::str::from_utf8(captures.get(1)?.as_bytes())
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
