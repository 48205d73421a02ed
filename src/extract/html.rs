// src/extract/html.rs

//! Table location and geometry parsing for HTML articles.
//!
//! The HTML full-text rendition carries only the grid dialect
//! (`tr`/`th`/`td` with `colspan`/`rowspan`); table citations appear as
//! anchors targeting the table's fragment id or as `rid` token lists.

use scraper::{ElementRef, Html, Selector};

use crate::extract::grid::{CellInput, Grid, RowGroup, RowInput, build_grid};
use crate::extract::{DocumentText, LocatedTable};
use crate::models::TableFragment;
use crate::utils::{normalize_ws, normalize_ws_opt};

/// Locate every table in an HTML article and reconstruct its geometry.
///
/// The HTML parser recovers from arbitrary tag soup, so this never fails;
/// a payload without tables simply yields an empty list.
pub fn extract_tables(text: &str) -> Vec<LocatedTable> {
    let document = Html::parse_document(text);
    let Ok(table_selector) = Selector::parse("table") else {
        return Vec::new();
    };

    let mut tables = Vec::new();
    for table in document.select(&table_selector) {
        let context = table
            .parent()
            .and_then(ElementRef::wrap)
            .unwrap_or(table);
        let identifier = table
            .value()
            .attr("id")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let reference_sentences = match &identifier {
            Some(id) => reference_sentences(&document, id),
            None => Vec::new(),
        };

        let fragment = TableFragment {
            identifier,
            label: context_text(table, context, ".label, .captions .label"),
            caption: context_text(table, context, "caption, .caption"),
            legend: context_text(table, context, ".legend, legend"),
            footer: context_text(table, context, "tfoot, .table-footnote, .footnotes"),
            raw_markup: context.html(),
            reference_sentences,
        };

        tables.push(LocatedTable {
            fragment,
            grid: table_grid(table),
        });
    }
    tables
}

/// Document-level text used as extraction context.
pub fn document_text(text: &str) -> DocumentText {
    let document = Html::parse_document(text);
    let root = document.root_element();
    DocumentText {
        title: select_text(root, "title, h1"),
        r#abstract: select_text(root, ".abstract, #abstract"),
        body: normalize_ws_opt(&element_text(root)),
    }
}

/// Every whitespace-normalized paragraph that cites the given table id,
/// either by an anchor to its fragment or a `rid` token list.
fn reference_sentences(document: &Html, table_id: &str) -> Vec<String> {
    let Ok(ref_selector) = Selector::parse("a[href], [rid]") else {
        return Vec::new();
    };
    let fragment = format!("#{table_id}");

    let mut seen = std::collections::HashSet::new();
    let mut sentences = Vec::new();
    for node in document.select(&ref_selector) {
        let href_hit = node.value().attr("href") == Some(fragment.as_str());
        let rid_hit = node
            .value()
            .attr("rid")
            .is_some_and(|rid| rid.split_whitespace().any(|token| token == table_id));
        if !href_hit && !rid_hit {
            continue;
        }
        let Some(para) = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| a.value().name() == "p")
        else {
            continue;
        };
        if !seen.insert(para.id()) {
            continue;
        }
        if let Some(text) = normalize_ws_opt(&element_text(para)) {
            sentences.push(text);
        }
    }
    sentences
}

/// Reconstruct the grid of one `<table>` element.
fn table_grid(table: ElementRef) -> Grid {
    let Ok(row_selector) = Selector::parse("tr") else {
        return Grid::default();
    };
    let Ok(cell_selector) = Selector::parse("th, td") else {
        return Grid::default();
    };

    let mut rows = Vec::new();
    for row in table.select(&row_selector) {
        // select() is recursive; skip rows belonging to a nested table.
        if nearest_table(row).map(|t| t.id()) != Some(table.id()) {
            continue;
        }
        let group = row_group(row);
        let cells = row
            .select(&cell_selector)
            .filter(|cell| cell.parent().map(|p| p.id()) == Some(row.id()))
            .map(|cell| CellInput {
                text: normalize_ws(&element_text(cell)),
                col_start: None,
                col_span: parse_span(cell.value().attr("colspan")),
                row_span: parse_span(cell.value().attr("rowspan")),
            })
            .collect();
        rows.push(RowInput { group, cells });
    }
    build_grid(&rows)
}

fn nearest_table(node: ElementRef) -> Option<ElementRef> {
    node.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

fn row_group(row: ElementRef) -> RowGroup {
    for ancestor in row.ancestors().filter_map(ElementRef::wrap) {
        match ancestor.value().name() {
            "thead" => return RowGroup::Head,
            "tfoot" => return RowGroup::Foot,
            "tbody" => return RowGroup::Body,
            "table" => break,
            _ => {}
        }
    }
    RowGroup::Body
}

fn parse_span(value: Option<&str>) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v >= 1)
        .unwrap_or(1)
}

fn element_text(node: ElementRef) -> String {
    node.text().collect::<Vec<_>>().join(" ")
}

/// Context text for a table: the table's own markup wins over siblings in
/// the enclosing wrapper.
fn context_text(table: ElementRef, context: ElementRef, selectors: &str) -> Option<String> {
    select_text(table, selectors).or_else(|| select_text(context, selectors))
}

fn select_text(context: ElementRef, selectors: &str) -> Option<String> {
    let selector = Selector::parse(selectors).ok()?;
    context
        .select(&selector)
        .next()
        .and_then(|n| normalize_ws_opt(&element_text(n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML_TABLE: &str = r##"<html><body>
        <p>Activation peaks are shown in <a href="#tbl1">Table 1</a>.</p>
        <p>Unrelated tables live in <a href="#tbl10">Table 10</a>.</p>
        <div class="table-wrap">
          <table id="tbl1">
            <caption>Table 1. Peak coordinates (Talairach).</caption>
            <thead>
              <tr><th>Region</th><th>x</th><th>y</th><th>z</th></tr>
            </thead>
            <tbody>
              <tr><td rowspan="2">dlPFC</td><td>-42</td><td>18</td><td>28</td></tr>
              <tr><td>-38</td><td>22</td><td>30</td></tr>
            </tbody>
            <tfoot><tr><td colspan="4">BA, Brodmann area.</td></tr></tfoot>
          </table>
        </div>
      </body></html>"##;

    #[test]
    fn table_is_located_with_context() {
        let tables = extract_tables(HTML_TABLE);
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.fragment.identifier.as_deref(), Some("tbl1"));
        assert_eq!(
            table.fragment.caption.as_deref(),
            Some("Table 1. Peak coordinates (Talairach).")
        );
        assert_eq!(table.fragment.footer.as_deref(), Some("BA, Brodmann area."));
    }

    #[test]
    fn rowspan_carries_and_foot_is_excluded() {
        let tables = extract_tables(HTML_TABLE);
        let grid = &tables[0].grid;
        assert_eq!(grid.header.len(), 1);
        assert_eq!(grid.body.len(), 2);
        assert_eq!(grid.body[1].text_at(0), Some("dlPFC"));
        assert_eq!(grid.body[1].text_at(1), Some("-38"));
    }

    #[test]
    fn anchor_citations_match_fragment_exactly() {
        let tables = extract_tables(HTML_TABLE);
        let sentences = &tables[0].fragment.reference_sentences;
        assert_eq!(sentences.len(), 1);
        assert!(sentences[0].contains("Activation peaks"));
    }

    #[test]
    fn rid_token_lists_are_matched() {
        let html = r#"<p>See <span rid="tbl1 tbl2">Tables 1 and 2</span>.</p>
            <table id="tbl1"><tr><td>1</td></tr></table>"#;
        let tables = extract_tables(html);
        assert_eq!(tables[0].fragment.reference_sentences.len(), 1);
    }

    #[test]
    fn soup_without_tables_is_empty_not_an_error() {
        assert!(extract_tables("<p>no tables here").is_empty());
    }

    #[test]
    fn nested_table_cells_stay_with_their_row() {
        let html = r#"<table id="outer"><tr><td>
              <table id="inner"><tr><td>9</td></tr></table>
            </td><td>2</td></tr></table>"#;
        let tables = extract_tables(html);
        let outer = tables.iter().find(|t| {
            t.fragment.identifier.as_deref() == Some("outer")
        });
        let outer = outer.unwrap();
        assert_eq!(outer.grid.body[0].cells.len(), 2);
        assert_eq!(outer.grid.body[0].text_at(1), Some("2"));
    }
}
