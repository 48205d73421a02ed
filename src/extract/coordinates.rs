// src/extract/coordinates.rs

//! Coordinate recognition over reconstructed table grids.
//!
//! Axis columns are found by header vocabulary, never by position. Header
//! rows are scanned top-down and the first row naming all three axes wins;
//! tables without a structural header fall back to scanning body rows for
//! an inline header row.

use crate::extract::grid::{Grid, GridRow};

/// Column indices of the recognized axes, plus an optional statistic column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisColumns {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub statistic: Option<usize>,
}

/// Where the coordinate data lives in a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub columns: AxisColumns,
    /// Index of the first data row in `grid.body`.
    pub data_start: usize,
}

/// One parsed coordinate row, before space inference.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub statistic: Option<f64>,
}

/// Locate the axis columns of a grid, if it is a coordinate table at all.
pub fn locate_axes(grid: &Grid) -> Option<TableLayout> {
    for row in &grid.header {
        if let Some(columns) = axes_in_row(row, grid.width()) {
            return Some(TableLayout {
                columns,
                data_start: 0,
            });
        }
    }
    // No structural header named the axes; some tables inline the header
    // as an ordinary body row.
    for (idx, row) in grid.body.iter().enumerate() {
        if let Some(columns) = axes_in_row(row, grid.width()) {
            return Some(TableLayout {
                columns,
                data_start: idx + 1,
            });
        }
    }
    None
}

/// Parse every data row under the located layout.
///
/// A row where any axis cell is missing or non-numeric is skipped whole; a
/// malformed statistic only drops the statistic.
pub fn extract_points(grid: &Grid, layout: &TableLayout) -> Vec<RawPoint> {
    let columns = layout.columns;
    grid.body
        .iter()
        .skip(layout.data_start)
        .filter_map(|row| {
            let x = parse_number(row.text_at(columns.x)?)?;
            let y = parse_number(row.text_at(columns.y)?)?;
            let z = parse_number(row.text_at(columns.z)?)?;
            let statistic = columns
                .statistic
                .and_then(|col| row.text_at(col))
                .and_then(parse_number);
            Some(RawPoint { x, y, z, statistic })
        })
        .collect()
}

fn axes_in_row(row: &GridRow, width: usize) -> Option<AxisColumns> {
    let mut x = None;
    let mut y = None;
    let mut z = None;
    let mut statistic = None;

    for col in 0..width {
        let Some(text) = row.text_at(col) else {
            continue;
        };
        let label = normalize_header(text);
        match label.as_str() {
            "x" if x.is_none() => x = Some(col),
            "y" if y.is_none() => y = Some(col),
            "z" if z.is_none() => z = Some(col),
            _ if statistic.is_none() && is_statistic_label(&label) => statistic = Some(col),
            _ => {}
        }
    }

    Some(AxisColumns {
        x: x?,
        y: y?,
        z: z?,
        statistic,
    })
}

/// Lowercase a header cell and strip units and decoration so that
/// "X (mm)" and "x, mm" both reduce to "x".
fn normalize_header(text: &str) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            _ => out.extend(ch.to_lowercase()),
        }
    }
    let out = out.replace(['*', '\u{2020}', '\u{2021}'], " ");
    let trimmed = out.trim().trim_end_matches([',', ':', ';', '.']).trim();
    // "x, mm" keeps only the axis token before the separator.
    match trimmed.split_once(',') {
        Some((head, _)) => head.trim().to_string(),
        None => trimmed.to_string(),
    }
}

fn is_statistic_label(label: &str) -> bool {
    matches!(
        label,
        "t" | "t value"
            | "t-value"
            | "z score"
            | "z-score"
            | "zscore"
            | "f"
            | "f value"
            | "f-value"
    )
}

/// Parse one numeric cell, tolerating typographic signs and separators.
fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .map(|ch| match ch {
            '\u{2212}' | '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .filter(|ch| *ch != ',')
        .collect();
    cleaned.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::grid::{CellInput, RowGroup, RowInput, build_grid};

    fn grid(header: &[&[&str]], body: &[&[&str]]) -> Grid {
        let mut rows = Vec::new();
        for texts in header {
            rows.push(RowInput {
                group: RowGroup::Head,
                cells: texts.iter().map(|t| CellInput::plain(*t)).collect(),
            });
        }
        for texts in body {
            rows.push(RowInput {
                group: RowGroup::Body,
                cells: texts.iter().map(|t| CellInput::plain(*t)).collect(),
            });
        }
        build_grid(&rows)
    }

    #[test]
    fn axes_found_by_header_vocabulary() {
        let grid = grid(
            &[&["Region", "x (mm)", "Y", "z", "t"]],
            &[&["ACC", "4", "-10", "42", "5.1"]],
        );
        let layout = locate_axes(&grid).unwrap();
        assert_eq!(layout.columns.x, 1);
        assert_eq!(layout.columns.y, 2);
        assert_eq!(layout.columns.z, 3);
        assert_eq!(layout.columns.statistic, Some(4));

        let points = extract_points(&grid, &layout);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].x, 4.0);
        assert_eq!(points[0].statistic, Some(5.1));
    }

    #[test]
    fn first_header_row_with_all_axes_wins() {
        let grid = grid(
            &[&["Coordinates", "", ""], &["x", "y", "z"]],
            &[&["1", "2", "3"]],
        );
        let layout = locate_axes(&grid).unwrap();
        assert_eq!((layout.columns.x, layout.columns.y), (0, 1));
    }

    #[test]
    fn inline_header_row_in_body_is_recognized() {
        let grid = grid(
            &[],
            &[&["x", "y", "z"], &["10", "20", "30"], &["-4", "6", "8"]],
        );
        let layout = locate_axes(&grid).unwrap();
        assert_eq!(layout.data_start, 1);
        let points = extract_points(&grid, &layout);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].x, -4.0);
    }

    #[test]
    fn rows_with_unparseable_axis_cells_are_skipped() {
        let grid = grid(
            &[&["x", "y", "z"]],
            &[&["1", "2", "3"], &["n/a", "5", "6"], &["7", "", "9"]],
        );
        let layout = locate_axes(&grid).unwrap();
        let points = extract_points(&grid, &layout);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].z, 3.0);
    }

    #[test]
    fn typographic_signs_and_separators_parse() {
        assert_eq!(parse_number("\u{2212}42"), Some(-42.0));
        assert_eq!(parse_number("\u{2013}8"), Some(-8.0));
        assert_eq!(parse_number("1,024"), Some(1024.0));
        assert_eq!(parse_number("  -3.5 "), Some(-3.5));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn z_score_column_is_statistic_not_axis() {
        let grid = grid(
            &[&["x", "y", "z", "Z-score"]],
            &[&["1", "2", "3", "4.2"]],
        );
        let layout = locate_axes(&grid).unwrap();
        assert_eq!(layout.columns.z, 2);
        assert_eq!(layout.columns.statistic, Some(3));
    }

    #[test]
    fn non_coordinate_tables_have_no_layout() {
        let grid = grid(&[&["Group", "N", "Age"]], &[&["Patients", "24", "31"]]);
        assert!(locate_axes(&grid).is_none());
    }

    #[test]
    fn malformed_statistic_drops_only_the_statistic() {
        let grid = grid(&[&["x", "y", "z", "t"]], &[&["1", "2", "3", "ns"]]);
        let layout = locate_axes(&grid).unwrap();
        let points = extract_points(&grid, &layout);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].statistic, None);
    }
}
