// src/pipeline/mod.rs

//! End-to-end orchestration: validate input, download, extract, assemble.
//!
//! Downloads run through the orchestrator's own concurrency bound;
//! extraction is CPU-bound parsing, so each article is handed to
//! `spawn_blocking` with a separate worker bound. Output order always
//! follows input order.

use std::collections::{HashMap, HashSet};

use futures::{StreamExt, stream};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::extract;
use crate::models::{StudyMetadata, StudyPayload, StudysetPayload};
use crate::services::{DownloadFailure, DownloadOrchestrator};

/// Batch counters reported alongside the studyset.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineStats {
    pub requested: usize,
    pub downloaded: usize,
    pub from_cache: usize,
    pub studies: usize,
    pub analyses: usize,
    pub points: usize,
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub studyset: StudysetPayload,
    pub failures: Vec<DownloadFailure>,
    pub stats: PipelineStats,
}

/// Download-then-extract pipeline over a batch of study records.
pub struct Pipeline {
    orchestrator: DownloadOrchestrator,
    workers: usize,
    fail_fast: bool,
}

impl Pipeline {
    pub fn new(orchestrator: DownloadOrchestrator, workers: usize, fail_fast: bool) -> Self {
        Self {
            orchestrator,
            workers,
            fail_fast,
        }
    }

    /// Run the full pipeline for a batch of studies.
    ///
    /// Every input study ends up either as a studyset entry or as a failure
    /// record; a study with zero extractable tables is a studyset entry
    /// with an empty analyses list, not a failure.
    pub async fn run(&self, studies: &[StudyMetadata]) -> Result<PipelineReport> {
        validate_input(studies)?;
        let mut stats = PipelineStats {
            requested: studies.len(),
            ..Default::default()
        };

        let report = self.orchestrator.download_all(studies).await?;
        stats.downloaded = report.articles.len();
        stats.from_cache = report.articles.iter().filter(|a| a.from_cache).count();
        let mut failures = report.failures;

        // Failure records cite the study's input position.
        let positions: HashMap<String, usize> = studies
            .iter()
            .enumerate()
            .map(|(index, study)| (study.identity_key(), index))
            .collect();

        let mut jobs = stream::iter(report.articles)
            .map(|article| async move {
                tokio::task::spawn_blocking(move || {
                    let analyses = extract::extract(&article);
                    (article, analyses)
                })
                .await
            })
            .buffered(self.workers.max(1));

        let mut studyset = StudysetPayload::new();
        while let Some(joined) = jobs.next().await {
            let (article, analyses) = joined.map_err(AppError::task)?;
            match analyses {
                Ok(analyses) => {
                    stats.analyses += analyses.len();
                    studyset.push_study(StudyPayload {
                        metadata: article.study,
                        analyses,
                    })?;
                }
                Err(error) => {
                    if self.fail_fast {
                        return Err(error);
                    }
                    log::warn!("Extraction failed for {}: {}", article.identifier(), error);
                    let index = positions
                        .get(&article.study.identity_key())
                        .copied()
                        .unwrap_or(usize::MAX);
                    failures.push(DownloadFailure::from_error(index, article.study, &error));
                }
            }
        }

        failures.sort_by_key(|f| f.index);
        stats.studies = studyset.len();
        stats.points = studyset.point_count();
        Ok(PipelineReport {
            studyset,
            failures,
            stats,
        })
    }
}

/// Reject batches with unidentifiable or duplicate studies up front.
fn validate_input(studies: &[StudyMetadata]) -> Result<()> {
    let mut seen = HashSet::new();
    for (index, study) in studies.iter().enumerate() {
        if !study.has_identifier() {
            return Err(AppError::input(format!(
                "study at position {index} carries no identifier"
            )));
        }
        let key = study.identity_key();
        if !seen.insert(key.clone()) {
            return Err(AppError::input(format!(
                "duplicate study identity {key} at position {index}"
            )));
        }
    }
    Ok(())
}
