// src/extract/mod.rs

//! Coordinate table extraction from downloaded article payloads.
//!
//! Extraction is a pure function of one [`ArticleContent`]: locate tables,
//! reconstruct their geometry, recognize coordinate columns, and infer the
//! stereotactic space from surrounding context. No I/O happens here, so
//! the pipeline can run it on blocking worker threads.

pub mod coordinates;
pub mod grid;
pub mod html;
pub mod space;
pub mod xml;

use crate::error::{AppError, Result};
use crate::models::{AnalysisPayload, ArticleContent, ContentFormat, PointPayload, TableFragment};
use crate::utils::normalize_ws_opt;

pub use coordinates::{AxisColumns, RawPoint, TableLayout};
pub use grid::{Grid, GridCell, GridRow};

/// Analysis name used when a table offers no caption, label, or legend.
const FALLBACK_ANALYSIS_NAME: &str = "Coordinate Table";

/// One located table: captured context plus reconstructed geometry.
#[derive(Debug, Clone)]
pub struct LocatedTable {
    pub fragment: TableFragment,
    pub grid: Grid,
}

/// Document-level text extracted alongside the tables.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DocumentText {
    pub title: Option<String>,
    pub r#abstract: Option<String>,
    pub body: Option<String>,
}

/// Extract every table of an article as an analysis.
///
/// Tables without recognizable coordinate columns are kept with an empty
/// point list. Fails only when the payload has no parseable document tree.
pub fn extract(article: &ArticleContent) -> Result<Vec<AnalysisPayload>> {
    let text = String::from_utf8_lossy(&article.payload);

    let (tables, document) = match article.format {
        ContentFormat::Xml => {
            let tables = xml::extract_tables(&text)
                .map_err(|e| AppError::malformed(article.identifier(), e))?;
            let document = xml::document_text(&text)
                .map_err(|e| AppError::malformed(article.identifier(), e))?;
            (tables, document)
        }
        ContentFormat::Html => (html::extract_tables(&text), html::document_text(&text)),
        // Plain text carries no table markup.
        ContentFormat::Plain => return Ok(Vec::new()),
    };

    let analyses = tables
        .into_iter()
        .map(|table| build_analysis(table, &document))
        .collect();
    Ok(analyses)
}

/// Extract the document-level text of an article.
pub fn extract_text(article: &ArticleContent) -> Result<DocumentText> {
    let text = String::from_utf8_lossy(&article.payload);
    match article.format {
        ContentFormat::Xml => xml::document_text(&text)
            .map_err(|e| AppError::malformed(article.identifier(), e)),
        ContentFormat::Html => Ok(html::document_text(&text)),
        ContentFormat::Plain => Ok(DocumentText {
            title: None,
            r#abstract: None,
            body: normalize_ws_opt(&text),
        }),
    }
}

fn build_analysis(table: LocatedTable, document: &DocumentText) -> AnalysisPayload {
    let LocatedTable { fragment, grid } = table;

    let space = space::infer_space(&fragment, document);
    let points = match coordinates::locate_axes(&grid) {
        Some(layout) => coordinates::extract_points(&grid, &layout)
            .into_iter()
            .map(|p| {
                let mut point = PointPayload::new(p.x, p.y, p.z, space);
                point.statistic = p.statistic;
                point
            })
            .collect(),
        None => Vec::new(),
    };

    let name = fragment
        .caption
        .clone()
        .or_else(|| fragment.label.clone())
        .or_else(|| fragment.legend.clone())
        .unwrap_or_else(|| FALLBACK_ANALYSIS_NAME.to_string());

    AnalysisPayload {
        name,
        points,
        table: fragment,
    }
}
