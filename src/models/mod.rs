// src/models/mod.rs

//! Typed data model for the pipeline.

pub mod article;
pub mod config;
pub mod study;
pub mod studyset;

pub use article::{ArticleContent, ContentFormat};
pub use config::{ApiConfig, Config, DownloadConfig, ExtractionConfig, RateLimitConfig};
pub use study::StudyMetadata;
pub use studyset::{
    AnalysisPayload, CoordinateSpace, PointPayload, StudyPayload, StudysetPayload, TableFragment,
};
