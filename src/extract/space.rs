// src/extract/space.rs

//! Coordinate space inference from table context.
//!
//! Sources are consulted in a fixed priority order and the first source
//! that matches any rule decides the space; later sources never override
//! an earlier match.

use crate::extract::DocumentText;
use crate::models::{CoordinateSpace, TableFragment};

/// Infer the coordinate space for one table.
///
/// Priority: caption, then legend, then table footer, then reference
/// sentences, then the document body text.
pub fn infer_space(fragment: &TableFragment, document: &DocumentText) -> CoordinateSpace {
    let reference_text = fragment.reference_sentences.join(" ");
    let sources = [
        fragment.caption.as_deref(),
        fragment.legend.as_deref(),
        fragment.footer.as_deref(),
        Some(reference_text.as_str()),
        document.body.as_deref(),
    ];

    for source in sources.into_iter().flatten() {
        if let Some(space) = match_space(source) {
            return space;
        }
    }
    CoordinateSpace::Unknown
}

/// Apply the vocabulary rules to one text source.
fn match_space(text: &str) -> Option<CoordinateSpace> {
    let text = text.to_lowercase();
    if text.contains("mni") || text.contains("montreal") {
        return Some(CoordinateSpace::Mni);
    }
    if text.contains("talair") || has_word(&text, "tal") {
        return Some(CoordinateSpace::Talairach);
    }
    if text.contains("spm") && text.contains("coordinate") {
        return Some(CoordinateSpace::Mni);
    }
    None
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == word)
}
