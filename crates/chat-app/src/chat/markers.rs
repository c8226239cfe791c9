use std::sync::LazyLock;

use regex::Regex;

/// Kind of heading that ends the reasoning preamble.
///
/// Declaration order is the tie-break when two markers start at the same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// `## ⚖️ Análisis Legal` or `## ⚖️ Respuesta Legal`.
    LegalHeading,
    /// Older answer layout opening with `1. Conceptualización`.
    NumberedHeading,
    /// `---` followed by a blank line and a heading.
    RuleThenHeading,
}

/// Where the final answer starts inside the accumulated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerMatch {
    pub kind: MarkerKind,
    /// Byte offset into the accumulated text, always on a char boundary.
    pub offset: usize,
}

struct Marker {
    kind: MarkerKind,
    pattern: Regex,
}

static MARKERS: LazyLock<Vec<Marker>> = LazyLock::new(|| {
    [
        (
            MarkerKind::LegalHeading,
            r"#{1,6}[ \t]*⚖\x{FE0F}?[ \t]*(?:Análisis|Respuesta) Legal",
        ),
        (
            MarkerKind::NumberedHeading,
            r"(?m)^(?:#{1,6}[ \t]*)?(?:\*\*)?1\.[ \t]+Conceptualización",
        ),
        (MarkerKind::RuleThenHeading, r"---\n\n#{1,6} "),
    ]
    .into_iter()
    .map(|(kind, pattern)| Marker {
        kind,
        // Patterns are literals checked by the tests below.
        pattern: Regex::new(pattern).expect("marker patterns are valid"),
    })
    .collect()
});

/// Finds the earliest transition marker in `text`.
///
/// Every marker is searched independently; the lowest offset wins and equal offsets fall
/// back to [`MarkerKind`] order.
pub fn find_transition(text: &str) -> Option<MarkerMatch> {
    earliest_match(&MARKERS, text)
}

fn earliest_match(markers: &[Marker], text: &str) -> Option<MarkerMatch> {
    let mut best: Option<MarkerMatch> = None;
    for marker in markers {
        let Some(found) = marker.pattern.find(text) else {
            continue;
        };
        if best.is_none_or(|current| found.start() < current.offset) {
            best = Some(MarkerMatch {
                kind: marker.kind,
                offset: found.start(),
            });
        }
    }
    best
}
