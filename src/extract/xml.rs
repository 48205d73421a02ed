// src/extract/xml.rs

//! Table location and geometry parsing for full-markup XML articles.
//!
//! Handles two table dialects found in publisher XML, selected by the
//! vocabulary actually present: CALS (`tgroup`/`colspec`/`row`/`entry` with
//! `namest`/`nameend`/`morerows`) and plain grids (`tr`/`th`/`td` with
//! `colspan`/`rowspan`). All element matching is namespace-agnostic since
//! publisher namespaces vary between DTD revisions.

use roxmltree::{Document, Node};

use crate::extract::grid::{CellInput, Grid, RowGroup, RowInput, build_grid};
use crate::extract::{DocumentText, LocatedTable};
use crate::models::TableFragment;
use crate::utils::{normalize_ws, normalize_ws_opt};

/// Locate every table in an XML article and reconstruct its geometry.
///
/// Returns a parse error only when the payload is not well-formed XML at
/// all; malformed individual tables degrade to empty grids instead.
pub fn extract_tables(text: &str) -> Result<Vec<LocatedTable>, roxmltree::Error> {
    let doc = Document::parse(text)?;
    let mut tables = Vec::new();

    for table in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "table")
    {
        let context = table
            .ancestors()
            .skip(1)
            .find(|n| n.is_element())
            .unwrap_or(table);
        let identifier = table
            .attribute("id")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let reference_sentences = match &identifier {
            Some(id) => reference_sentences(&doc, id),
            None => Vec::new(),
        };

        let fragment = TableFragment {
            identifier,
            label: context_text(table, context, &["label"]),
            caption: context_text(table, context, &["caption"]),
            legend: context_text(table, context, &["legend"]),
            footer: context_text(
                table,
                context,
                &["table-footnote", "table-foot", "table-wrap-foot"],
            ),
            raw_markup: text[context.range()].to_string(),
            reference_sentences,
        };

        let grid = if has_descendant(table, &["tgroup", "colspec", "entry"]) {
            cals_grid(table)
        } else {
            generic_grid(table)
        };

        tables.push(LocatedTable { fragment, grid });
    }

    Ok(tables)
}

/// Document-level text used as extraction context.
pub fn document_text(text: &str) -> Result<DocumentText, roxmltree::Error> {
    let doc = Document::parse(text)?;
    let root = doc.root_element();
    Ok(DocumentText {
        title: first_descendant_text(root, &["title"]),
        r#abstract: first_descendant_text(root, &["abstract"]),
        body: first_descendant_text(root, &["body", "sections"]),
    })
}

/// Every whitespace-normalized paragraph that cites the given table id.
///
/// A citation is a `cross-ref`/`cross-refs` element whose `refid` token list
/// contains the id as an exact whole token; the recorded sentence is the
/// nearest enclosing paragraph's text.
fn reference_sentences(doc: &Document, table_id: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut sentences = Vec::new();

    for node in doc.descendants().filter(|n| {
        n.is_element() && matches!(n.tag_name().name(), "cross-ref" | "cross-refs")
    }) {
        let Some(refid) = node.attribute("refid") else {
            continue;
        };
        if !refid.split_whitespace().any(|token| token == table_id) {
            continue;
        }
        let Some(para) = node
            .ancestors()
            .find(|a| a.is_element() && matches!(a.tag_name().name(), "para" | "simple-para" | "p"))
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

/// Reconstruct a CALS table (first `tgroup`).
fn cals_grid(table: Node) -> Grid {
    let Some(tgroup) = table
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "tgroup")
    else {
        return generic_grid(table);
    };

    // Column order from colspec declarations; cells address columns by name.
    let colspecs: Vec<Node> = tgroup
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "colspec")
        .collect();
    let col_names: Vec<String> = colspecs
        .iter()
        .enumerate()
        .map(|(idx, spec)| {
            spec.attribute("colname")
                .map(String::from)
                .unwrap_or_else(|| format!("col{}", idx + 1))
        })
        .collect();
    let col_index = |name: &str| col_names.iter().position(|n| n == name);

    let mut rows = Vec::new();
    for row in tgroup
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "row")
    {
        let group = row_group(row);
        let cells = row
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "entry")
            .map(|entry| {
                let col_start = entry
                    .attribute("colname")
                    .or_else(|| entry.attribute("namest"))
                    .and_then(&col_index);
                let col_span = match (entry.attribute("namest"), entry.attribute("nameend")) {
                    (Some(start), Some(end)) => match (col_index(start), col_index(end)) {
                        (Some(s), Some(e)) if e >= s => e - s + 1,
                        _ => 1,
                    },
                    _ => parse_span(entry.attribute("colspan")),
                };
                // `morerows` counts additional rows below this one.
                let row_span = entry
                    .attribute("morerows")
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .map(|extra| extra + 1)
                    .unwrap_or(1);
                CellInput {
                    text: normalize_ws(&element_text(entry)),
                    col_start,
                    col_span,
                    row_span,
                }
            })
            .collect();
        rows.push(RowInput { group, cells });
    }

    build_grid(&rows)
}

/// Reconstruct a `tr`/`th`/`td` table embedded in XML.
fn generic_grid(table: Node) -> Grid {
    let mut rows = Vec::new();
    for row in table
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "tr")
    {
        let group = row_group(row);
        let cells = row
            .children()
            .filter(|n| n.is_element() && matches!(n.tag_name().name(), "th" | "td"))
            .map(|cell| CellInput {
                text: normalize_ws(&element_text(cell)),
                col_start: None,
                col_span: parse_span(cell.attribute("colspan")),
                row_span: parse_span(cell.attribute("rowspan")),
            })
            .collect();
        rows.push(RowInput { group, cells });
    }
    build_grid(&rows)
}

/// Structural group of a row by its enclosing head/body/foot element.
fn row_group(row: Node) -> RowGroup {
    for ancestor in row.ancestors() {
        match ancestor.tag_name().name() {
            "thead" => return RowGroup::Head,
            "tfoot" => return RowGroup::Foot,
            "tbody" => return RowGroup::Body,
            "table" | "tgroup" => break,
            _ => {}
        }
    }
    RowGroup::Body
}

/// Span attribute value; malformed values fall back to 1 rather than
/// failing the table.
fn parse_span(value: Option<&str>) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v >= 1)
        .unwrap_or(1)
}

/// Concatenated text of all descendant text nodes.
fn element_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Context text for a table: the table's own markup wins over siblings in
/// the enclosing wrapper.
fn context_text(table: Node, context: Node, names: &[&str]) -> Option<String> {
    first_descendant_text(table, names).or_else(|| first_descendant_text(context, names))
}

fn first_descendant_text(node: Node, names: &[&str]) -> Option<String> {
    node.descendants()
        .find(|n| n.is_element() && names.contains(&n.tag_name().name()))
        .and_then(|n| normalize_ws_opt(&element_text(n)))
}

fn has_descendant(node: Node, names: &[&str]) -> bool {
    node.descendants()
        .any(|n| n.is_element() && names.contains(&n.tag_name().name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALS_TABLE: &str = r#"
        <article xmlns:ce="http://www.elsevier.com/xml/common/dtd">
          <ce:floats>
            <ce:table id="tbl1">
              <ce:label>Table 1</ce:label>
              <ce:caption>Peak activation coordinates (MNI space).</ce:caption>
              <tgroup cols="4">
                <colspec colname="col1"/>
                <colspec colname="col2"/>
                <colspec colname="col3"/>
                <colspec colname="col4"/>
                <thead>
                  <row>
                    <entry namest="col1" nameend="col3">Coordinates</entry>
                    <entry>t</entry>
                  </row>
                  <row>
                    <entry>x</entry><entry>y</entry><entry>z</entry><entry></entry>
                  </row>
                </thead>
                <tbody>
                  <row>
                    <entry>12</entry><entry>-34</entry><entry>7</entry><entry>4.1</entry>
                  </row>
                  <row morerows="bogus">
                    <entry>-8</entry><entry>22</entry><entry>40</entry><entry>3.2</entry>
                  </row>
                </tbody>
              </tgroup>
              <ce:table-footnote>Coordinates reported in Talairach space.</ce:table-footnote>
            </ce:table>
          </ce:floats>
          <ce:sections>
            <ce:para>Peaks are listed in <ce:cross-ref refid="tbl1">Table 1</ce:cross-ref>.</ce:para>
            <ce:para>Both experiments appear in <ce:cross-refs refid="tbl1 tbl2">Tables 1 and 2</ce:cross-refs>.</ce:para>
            <ce:para>See <ce:cross-ref refid="tbl10">Table 10</ce:cross-ref> for controls.</ce:para>
          </ce:sections>
        </article>"#;

    #[test]
    fn cals_table_is_located_with_context() {
        let tables = extract_tables(CALS_TABLE).unwrap();
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.fragment.identifier.as_deref(), Some("tbl1"));
        assert_eq!(table.fragment.label.as_deref(), Some("Table 1"));
        assert_eq!(
            table.fragment.caption.as_deref(),
            Some("Peak activation coordinates (MNI space).")
        );
        assert_eq!(
            table.fragment.footer.as_deref(),
            Some("Coordinates reported in Talairach space.")
        );
        assert!(table.fragment.raw_markup.contains("tgroup"));
    }

    #[test]
    fn cals_spanned_header_is_one_cell() {
        let tables = extract_tables(CALS_TABLE).unwrap();
        let grid = &tables[0].grid;
        assert_eq!(grid.header.len(), 2);
        assert_eq!(grid.header[0].cells.len(), 2);
        assert_eq!(grid.header[0].cells[0].text, "Coordinates");
        assert_eq!(grid.header[0].cells[0].col_span, 3);
        assert_eq!(grid.header[1].text_at(0), Some("x"));
        assert_eq!(grid.body.len(), 2);
        assert_eq!(grid.body[0].text_at(3), Some("4.1"));
    }

    #[test]
    fn malformed_morerows_is_ignored() {
        let tables = extract_tables(CALS_TABLE).unwrap();
        // The bogus morerows row still parses as a plain row.
        assert_eq!(tables[0].grid.body[1].text_at(0), Some("-8"));
        assert_eq!(tables[0].grid.body[1].cells.len(), 4);
    }

    #[test]
    fn crossref_token_matching_is_exact() {
        let tables = extract_tables(CALS_TABLE).unwrap();
        let sentences = &tables[0].fragment.reference_sentences;
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("Peaks are listed"));
        // Multi-target refid lists count for each listed table.
        assert!(sentences[1].contains("Both experiments"));
        // "tbl10" must not match "tbl1" by substring.
        assert!(!sentences.iter().any(|s| s.contains("controls")));
    }

    #[test]
    fn table_without_id_has_no_reference_sentences() {
        let xml = r#"<doc><table><tr><td>1</td></tr></table>
            <para>mentions <cross-ref refid="tbl1">a table</cross-ref></para></doc>"#;
        let tables = extract_tables(xml).unwrap();
        assert_eq!(tables.len(), 1);
        assert!(tables[0].fragment.identifier.is_none());
        assert!(tables[0].fragment.reference_sentences.is_empty());
    }

    #[test]
    fn generic_rows_with_rowspan() {
        let xml = r#"<doc><table id="t">
            <thead><tr><th>region</th><th>x</th></tr></thead>
            <tbody>
              <tr><td rowspan="2">ACC</td><td>3</td></tr>
              <tr><td>5</td></tr>
            </tbody></table></doc>"#;
        let tables = extract_tables(xml).unwrap();
        let grid = &tables[0].grid;
        assert_eq!(grid.body[1].text_at(0), Some("ACC"));
        assert_eq!(grid.body[1].text_at(1), Some("5"));
    }

    #[test]
    fn inline_markup_inside_cells_reads_once() {
        // Child elements must not double the surrounding text runs.
        let xml = r#"<doc><table id="t">
            <tr><th>x</th><th>y</th><th>z</th></tr>
            <tr><td>12<sup>a</sup></td><td><bold>-34</bold></td><td>7</td></tr>
            </table></doc>"#;
        let tables = extract_tables(xml).unwrap();
        let grid = &tables[0].grid;
        assert_eq!(grid.header[0].text_at(0), Some("x"));
        assert_eq!(grid.body[0].text_at(0), Some("12 a"));
        assert_eq!(grid.body[0].text_at(1), Some("-34"));
    }

    #[test]
    fn invalid_xml_is_an_error() {
        assert!(extract_tables("<doc><unclosed>").is_err());
    }

    #[test]
    fn document_text_sections() {
        let xml = r#"<article>
            <title>Neural correlates of memory</title>
            <abstract>We scanned people.</abstract>
            <body><para>Findings were robust.</para></body>
          </article>"#;
        let text = document_text(xml).unwrap();
        assert_eq!(text.title.as_deref(), Some("Neural correlates of memory"));
        assert_eq!(text.r#abstract.as_deref(), Some("We scanned people."));
        assert_eq!(text.body.as_deref(), Some("Findings were robust."));
    }
}
