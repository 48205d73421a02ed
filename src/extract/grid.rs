// src/extract/grid.rs

//! Table geometry reconstruction.
//!
//! Dialect parsers (CALS XML, HTML-style rows) reduce a source table to
//! [`RowInput`] records; [`build_grid`] turns those into a normalized
//! row×cell grid honoring horizontal and vertical spans. Header rows are
//! distinguished by their structural group (head/body/foot), never by
//! content heuristics.

/// Structural group a row belongs to in the source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowGroup {
    Head,
    Body,
    Foot,
}

/// One source cell as reported by a dialect parser.
#[derive(Debug, Clone)]
pub struct CellInput {
    pub text: String,

    /// Explicit starting column (CALS `colname`/`namest`); `None` means the
    /// next free column.
    pub col_start: Option<usize>,

    /// Horizontal span; dialects emit 1 for malformed span attributes.
    pub col_span: usize,

    /// Vertical span; dialects emit 1 for malformed span attributes.
    pub row_span: usize,
}

impl CellInput {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            col_start: None,
            col_span: 1,
            row_span: 1,
        }
    }
}

/// One source row as reported by a dialect parser.
#[derive(Debug, Clone)]
pub struct RowInput {
    pub group: RowGroup,
    pub cells: Vec<CellInput>,
}

/// A reconstructed cell: represented once, with its span preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub text: String,
    pub col_start: usize,
    pub col_span: usize,
}

impl GridCell {
    /// Whether this cell covers the given column index.
    pub fn covers(&self, col: usize) -> bool {
        col >= self.col_start && col < self.col_start + self.col_span
    }
}

/// One reconstructed row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridRow {
    pub cells: Vec<GridCell>,
}

impl GridRow {
    /// Text of the cell covering the given column, if any.
    pub fn text_at(&self, col: usize) -> Option<&str> {
        self.cells
            .iter()
            .find(|c| c.covers(col))
            .map(|c| c.text.as_str())
    }
}

/// Normalized table geometry: header and body rows with span-aware cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    pub header: Vec<GridRow>,
    pub body: Vec<GridRow>,
}

impl Grid {
    /// Column count: the widest extent of any row.
    pub fn width(&self) -> usize {
        self.header
            .iter()
            .chain(self.body.iter())
            .flat_map(|row| row.cells.iter())
            .map(|c| c.col_start + c.col_span)
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.body.is_empty()
    }
}

/// A cell carried downward by a vertical span.
#[derive(Debug, Clone)]
struct Pending {
    text: String,
    col_start: usize,
    col_span: usize,
    remaining: usize,
}

/// Reconstruct a grid from dialect-parsed rows.
///
/// Head rows land in `header`, body rows in `body`; foot rows are dropped
/// from the geometry (their text is captured separately as the table
/// footer). Vertical spans carry a cell's text into subsequent rows of the
/// same group.
pub fn build_grid(rows: &[RowInput]) -> Grid {
    let mut grid = Grid::default();
    let mut pending: Vec<Pending> = Vec::new();
    let mut last_group: Option<RowGroup> = None;

    for row in rows {
        if row.group == RowGroup::Foot {
            continue;
        }
        // Spans do not leak across the head/body boundary.
        if last_group != Some(row.group) {
            pending.clear();
            last_group = Some(row.group);
        }

        let mut cells: Vec<GridCell> = Vec::new();

        // Cells carried down from earlier rows occupy their columns first.
        for carry in &mut pending {
            cells.push(GridCell {
                text: carry.text.clone(),
                col_start: carry.col_start,
                col_span: carry.col_span,
            });
            carry.remaining -= 1;
        }
        pending.retain(|c| c.remaining > 0);

        let mut pointer = 0usize;
        for cell in &row.cells {
            let start = match cell.col_start {
                Some(start) => start,
                None => {
                    let mut candidate = pointer;
                    while cells.iter().any(|c| c.covers(candidate)) {
                        candidate += 1;
                    }
                    candidate
                }
            };
            let span = cell.col_span.max(1);

            cells.push(GridCell {
                text: cell.text.clone(),
                col_start: start,
                col_span: span,
            });
            pointer = pointer.max(start + span);

            if cell.row_span > 1 {
                pending.push(Pending {
                    text: cell.text.clone(),
                    col_start: start,
                    col_span: span,
                    remaining: cell.row_span - 1,
                });
            }
        }

        cells.sort_by_key(|c| c.col_start);
        let grid_row = GridRow { cells };
        match row.group {
            RowGroup::Head => grid.header.push(grid_row),
            RowGroup::Body => grid.body.push(grid_row),
            RowGroup::Foot => unreachable!("foot rows filtered above"),
        }
    }

    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(group: RowGroup, texts: &[&str]) -> RowInput {
        RowInput {
            group,
            cells: texts.iter().map(|t| CellInput::plain(*t)).collect(),
        }
    }

    #[test]
    fn plain_rows_index_sequentially() {
        let grid = build_grid(&[
            row(RowGroup::Head, &["x", "y", "z"]),
            row(RowGroup::Body, &["1", "2", "3"]),
        ]);
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.header[0].text_at(1), Some("y"));
        assert_eq!(grid.body[0].text_at(2), Some("3"));
    }

    #[test]
    fn spanned_header_cell_is_represented_once() {
        let rows = vec![
            RowInput {
                group: RowGroup::Head,
                cells: vec![
                    CellInput {
                        text: "Coordinates".into(),
                        col_start: None,
                        col_span: 3,
                        row_span: 1,
                    },
                    CellInput::plain("t"),
                ],
            },
            row(RowGroup::Head, &["x", "y", "z", ""]),
        ];
        let grid = build_grid(&rows);

        let first = &grid.header[0];
        assert_eq!(first.cells.len(), 2);
        assert_eq!(first.cells[0].text, "Coordinates");
        assert_eq!(first.cells[0].col_span, 3);
        assert_eq!(first.cells[1].col_start, 3);
        // The spanned cell answers for every covered column.
        assert_eq!(first.text_at(0), Some("Coordinates"));
        assert_eq!(first.text_at(2), Some("Coordinates"));
        assert_eq!(first.text_at(3), Some("t"));
    }

    #[test]
    fn row_span_carries_text_down() {
        let rows = vec![
            RowInput {
                group: RowGroup::Body,
                cells: vec![
                    CellInput {
                        text: "Left".into(),
                        col_start: None,
                        col_span: 1,
                        row_span: 2,
                    },
                    CellInput::plain("10"),
                ],
            },
            row(RowGroup::Body, &["20"]),
        ];
        let grid = build_grid(&rows);

        assert_eq!(grid.body[1].text_at(0), Some("Left"));
        assert_eq!(grid.body[1].text_at(1), Some("20"));
    }

    #[test]
    fn explicit_column_starts_are_honored() {
        let rows = vec![RowInput {
            group: RowGroup::Body,
            cells: vec![
                CellInput {
                    text: "only third".into(),
                    col_start: Some(2),
                    col_span: 1,
                    row_span: 1,
                },
                CellInput::plain("next"),
            ],
        }];
        let grid = build_grid(&rows);
        assert_eq!(grid.body[0].text_at(2), Some("only third"));
        assert_eq!(grid.body[0].text_at(3), Some("next"));
    }

    #[test]
    fn foot_rows_are_excluded_from_geometry() {
        let grid = build_grid(&[
            row(RowGroup::Head, &["x"]),
            row(RowGroup::Body, &["1"]),
            row(RowGroup::Foot, &["note"]),
        ]);
        assert_eq!(grid.header.len(), 1);
        assert_eq!(grid.body.len(), 1);
    }

    #[test]
    fn spans_do_not_leak_from_header_into_body() {
        let rows = vec![
            RowInput {
                group: RowGroup::Head,
                cells: vec![CellInput {
                    text: "Region".into(),
                    col_start: None,
                    col_span: 1,
                    row_span: 5,
                }],
            },
            row(RowGroup::Body, &["Amygdala"]),
        ];
        let grid = build_grid(&rows);
        assert_eq!(grid.body[0].text_at(0), Some("Amygdala"));
        assert_eq!(grid.body[0].cells.len(), 1);
    }
}
