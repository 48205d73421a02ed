// src/models/studyset.rs

//! NIMADS-shaped output types: studyset → studies → analyses → points.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::StudyMetadata;

/// Coordinate reference space for a reported x/y/z triplet.
///
/// Closed enumeration plus an explicit unknown sentinel; the extractor never
/// guesses a space without a matching indicator token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSpace {
    #[serde(rename = "MNI")]
    Mni,
    #[serde(rename = "TAL")]
    Talairach,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// One coordinate observation extracted from a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    /// Spatial coordinates, always exactly three
    pub coordinates: [f64; 3],

    /// Inferred coordinate space for the enclosing table
    pub space: CoordinateSpace,

    /// Statistic value reported on the same row, when recognized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistic: Option<f64>,
}

impl PointPayload {
    pub fn new(x: f64, y: f64, z: f64, space: CoordinateSpace) -> Self {
        Self {
            coordinates: [x, y, z],
            space,
            statistic: None,
        }
    }
}

/// Raw markup and context captured for one located table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableFragment {
    /// Identifier attribute of the table element, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Table label ("Table 2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Caption text, whitespace-normalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Legend text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,

    /// Table footer text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,

    /// Raw markup of the table (and its enclosing float, when available)
    pub raw_markup: String,

    /// Body-text paragraphs that reference this table by identifier
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_sentences: Vec<String>,
}

/// One extracted table with its parsed coordinate points.
///
/// An analysis with zero points is valid: the table was located but carried
/// no parseable coordinate columns. That case is distinct from extraction
/// failure, which surfaces as an error instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    /// Human-readable name, derived from caption > label > legend
    pub name: String,

    /// Parsed coordinate observations
    pub points: Vec<PointPayload>,

    /// Source table markup and context
    pub table: TableFragment,
}

/// One study with its extracted analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPayload {
    #[serde(flatten)]
    pub metadata: StudyMetadata,

    pub analyses: Vec<AnalysisPayload>,
}

/// Top-level aggregate dataset.
///
/// Study identity is unique within a studyset and insertion order is
/// preserved for reproducibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudysetPayload {
    pub studies: Vec<StudyPayload>,
}

impl StudysetPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a study, rejecting duplicate identities.
    pub fn push_study(&mut self, study: StudyPayload) -> Result<()> {
        let key = study.metadata.identity_key();
        if self.studies.iter().any(|s| s.metadata.identity_key() == key) {
            return Err(AppError::input(format!("duplicate study identity: {key}")));
        }
        self.studies.push(study);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.studies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.studies.is_empty()
    }

    /// Total point count across all analyses.
    pub fn point_count(&self) -> usize {
        self.studies
            .iter()
            .flat_map(|s| s.analyses.iter())
            .map(|a| a.points.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_serializes_with_upper_names() {
        assert_eq!(serde_json::to_string(&CoordinateSpace::Mni).unwrap(), "\"MNI\"");
        assert_eq!(
            serde_json::to_string(&CoordinateSpace::Talairach).unwrap(),
            "\"TAL\""
        );
        assert_eq!(
            serde_json::to_string(&CoordinateSpace::Unknown).unwrap(),
            "\"UNKNOWN\""
        );
    }

    #[test]
    fn push_study_rejects_duplicate_identity() {
        let mut set = StudysetPayload::new();
        let study = StudyPayload {
            metadata: StudyMetadata::from_doi("10.1/a"),
            analyses: Vec::new(),
        };
        set.push_study(study.clone()).unwrap();
        assert!(set.push_study(study).is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn push_study_preserves_order() {
        let mut set = StudysetPayload::new();
        for doi in ["10.1/a", "10.1/b", "10.1/c"] {
            set.push_study(StudyPayload {
                metadata: StudyMetadata::from_doi(doi),
                analyses: Vec::new(),
            })
            .unwrap();
        }
        let order: Vec<_> = set
            .studies
            .iter()
            .map(|s| s.metadata.doi.clone().unwrap())
            .collect();
        assert_eq!(order, vec!["10.1/a", "10.1/b", "10.1/c"]);
    }
}
