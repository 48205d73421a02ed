// src/models/study.rs

//! Study metadata as supplied by the search stage.

use serde::{Deserialize, Serialize};

/// Bibliographic metadata for one study.
///
/// Produced by the external search collaborator and consumed read-only by
/// the download orchestrator. At least one of `doi`, `pmid` or `pmcid` must
/// be present; the pipeline validates this at its boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StudyMetadata {
    /// Digital Object Identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    /// PubMed identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,

    /// PubMed Central identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,

    /// Publisher item identifier (Elsevier PII)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii: Option<String>,

    /// Article title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Author display names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,

    /// Journal name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,

    /// Publication year
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    /// Whether the article is open access
    #[serde(default)]
    pub open_access: bool,
}

impl StudyMetadata {
    /// Construct a study record from a DOI alone.
    pub fn from_doi(doi: impl Into<String>) -> Self {
        Self {
            doi: Some(doi.into()),
            ..Self::default()
        }
    }

    /// Best available identifier in doi > pmid > pmcid > pii order.
    pub fn identifier(&self) -> Option<&str> {
        [&self.doi, &self.pmid, &self.pmcid, &self.pii]
            .into_iter()
            .filter_map(|id| id.as_deref())
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// True when the record carries at least one usable identifier.
    pub fn has_identifier(&self) -> bool {
        self.identifier().is_some()
    }

    /// Stable identity key used for uniqueness within a studyset.
    pub fn identity_key(&self) -> String {
        match (self.doi.as_deref(), self.pmid.as_deref(), self.pmcid.as_deref()) {
            (Some(doi), _, _) if !doi.trim().is_empty() => format!("doi:{}", doi.trim()),
            (_, Some(pmid), _) if !pmid.trim().is_empty() => format!("pmid:{}", pmid.trim()),
            (_, _, Some(pmcid)) if !pmcid.trim().is_empty() => format!("pmcid:{}", pmcid.trim()),
            _ => format!("pii:{}", self.pii.as_deref().unwrap_or("").trim()),
        }
    }
}
