//! Turns a live completion stream into the text shown to the user.
//!
//! Models answer in two phases: a blockquoted reasoning preamble followed by the final
//! answer, which opens with one of the headings in [`super::markers`]. While reasoning, only
//! the most recent paragraphs are displayed under a fixed header so the view stays bounded.
//! Once a heading shows up the display restarts at that heading and then grows verbatim.

use super::markers::{MarkerKind, find_transition};

/// Token that opens a blockquoted reasoning line.
pub const REASONING_TOKEN: &str = "> ";
/// Blank blockquote line separating two reasoning paragraphs.
pub const PARAGRAPH_DELIMITER: &str = "\n> \n> ";
pub const REASONING_HEADER: &str = "🤔 Proceso de razonamiento:\n\n> ";
pub const DEFAULT_REASONING_WINDOW: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Reasoning,
    Final,
}

/// Per-stream segmentation state. One instance lives exactly as long as one send.
#[derive(Debug, Clone)]
pub struct StreamSegmenter {
    raw: String,
    phase: Phase,
    final_text: String,
    display: String,
    transition: Option<MarkerKind>,
    reasoning_window: usize,
}

impl Default for StreamSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_REASONING_WINDOW)
    }
}

impl StreamSegmenter {
    /// Creates a segmenter that keeps the last `reasoning_window` paragraphs while reasoning.
    ///
    /// A window of zero is treated as one.
    pub fn new(reasoning_window: usize) -> Self {
        Self {
            raw: String::new(),
            phase: Phase::Reasoning,
            final_text: String::new(),
            display: String::new(),
            transition: None,
            reasoning_window: reasoning_window.max(1),
        }
    }

    /// Feeds one fragment and returns the updated display text.
    pub fn push(&mut self, fragment: &str) -> &str {
        self.raw.push_str(fragment);

        match self.phase {
            Phase::Final => {
                self.final_text.push_str(fragment);
                self.display.clone_from(&self.final_text);
            }
            Phase::Reasoning => {
                if let Some(found) = find_transition(&self.raw) {
                    tracing::info!(
                        marker = ?found.kind,
                        offset = found.offset,
                        raw_len = self.raw.len(),
                        "final answer marker detected"
                    );
                    self.phase = Phase::Final;
                    self.transition = Some(found.kind);
                    self.final_text = self.raw[found.offset..].to_string();
                    self.display.clone_from(&self.final_text);
                } else {
                    self.display = shape_reasoning(&self.raw, self.reasoning_window);
                }
            }
        }

        &self.display
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    /// Everything received so far, untouched by shaping.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn final_text(&self) -> &str {
        &self.final_text
    }

    /// Marker that ended the reasoning phase, if any.
    pub fn transition(&self) -> Option<MarkerKind> {
        self.transition
    }
}

/// Bounds reasoning text to its last `window` paragraphs.
///
/// Text without the reasoning token is returned unchanged.
pub fn shape_reasoning(raw: &str, window: usize) -> String {
    let Some(start) = raw.find(REASONING_TOKEN) else {
        return raw.to_string();
    };

    let body = &raw[start + REASONING_TOKEN.len()..];
    let paragraphs = body.split(PARAGRAPH_DELIMITER).collect::<Vec<_>>();
    let kept = &paragraphs[paragraphs.len().saturating_sub(window.max(1))..];

    let mut shaped = String::with_capacity(REASONING_HEADER.len() + body.len());
    shaped.push_str(REASONING_HEADER);
    shaped.push_str(&kept.join(PARAGRAPH_DELIMITER));
    shaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(fragments: &[&str]) -> StreamSegmenter {
        let mut segmenter = StreamSegmenter::default();
        for fragment in fragments {
            segmenter.push(fragment);
        }
        segmenter
    }

    #[test]
    fn plain_text_is_echoed_verbatim() {
        let mut segmenter = StreamSegmenter::default();
        assert_eq!(segmenter.push("Hola, "), "Hola, ");
        assert_eq!(segmenter.push("¿en qué "), "Hola, ¿en qué ");
        assert_eq!(segmenter.push("puedo ayudar?"), "Hola, ¿en qué puedo ayudar?");
        assert_eq!(segmenter.phase(), Phase::Reasoning);
    }

    #[test]
    fn reasoning_keeps_last_two_paragraphs() {
        let segmenter = feed(&["Pensando... ", "> Paso 1\n> \n> Paso 2\n> \n> Paso 3"]);
        assert_eq!(
            segmenter.display(),
            "🤔 Proceso de razonamiento:\n\n> Paso 2\n> \n> Paso 3"
        );
        assert_eq!(segmenter.raw(), "Pensando... > Paso 1\n> \n> Paso 2\n> \n> Paso 3");
        assert!(segmenter.final_text().is_empty());
    }

    #[test]
    fn single_paragraph_is_shown_in_full() {
        let segmenter = feed(&["> Revisando ", "el contrato"]);
        assert_eq!(
            segmenter.display(),
            "🤔 Proceso de razonamiento:\n\n> Revisando el contrato"
        );
    }

    #[test]
    fn heading_switches_to_final_and_drops_preamble() {
        let mut segmenter = StreamSegmenter::default();
        segmenter.push("algo de contexto ");
        let display = segmenter
            .push("## ⚖️ Análisis Legal\n\nEl artículo 123...")
            .to_string();

        assert_eq!(segmenter.phase(), Phase::Final);
        assert_eq!(display, "## ⚖️ Análisis Legal\n\nEl artículo 123...");
        assert_eq!(segmenter.transition(), Some(MarkerKind::LegalHeading));
        assert!(segmenter.raw().starts_with("algo de contexto "));
    }

    #[test]
    fn final_phase_appends_without_shaping() {
        let mut segmenter = feed(&["> pienso\n> \n> ", "## ⚖️ Respuesta Legal\n"]);
        segmenter.push("> cita textual\n> \n> ");
        segmenter.push("> otra cita\n> \n> ");
        segmenter.push("> y otra");

        assert_eq!(segmenter.phase(), Phase::Final);
        assert_eq!(
            segmenter.display(),
            "## ⚖️ Respuesta Legal\n> cita textual\n> \n> > otra cita\n> \n> > y otra"
        );
    }

    #[test]
    fn later_markers_do_not_restart_final_text() {
        let segmenter = feed(&[
            "## ⚖️ Análisis Legal\n",
            "texto\n---\n\n## Conclusión\n",
        ]);
        assert_eq!(
            segmenter.display(),
            "## ⚖️ Análisis Legal\ntexto\n---\n\n## Conclusión\n"
        );
        assert_eq!(segmenter.transition(), Some(MarkerKind::LegalHeading));
    }

    #[test]
    fn rule_before_heading_wins() {
        let segmenter = feed(&["> razonando\n---\n\n## ⚖️ Análisis Legal\nTexto"]);
        assert_eq!(segmenter.transition(), Some(MarkerKind::RuleThenHeading));
        assert_eq!(segmenter.display(), "---\n\n## ⚖️ Análisis Legal\nTexto");
    }

    #[test]
    fn window_of_zero_behaves_as_one() {
        let mut segmenter = StreamSegmenter::new(0);
        segmenter.push("> a\n> \n> b");
        assert_eq!(segmenter.display(), "🤔 Proceso de razonamiento:\n\n> b");
    }

    #[test]
    fn wider_window_keeps_more_paragraphs() {
        assert_eq!(
            shape_reasoning("> a\n> \n> b\n> \n> c\n> \n> d", 3),
            "🤔 Proceso de razonamiento:\n\n> b\n> \n> c\n> \n> d"
        );
    }

    #[test]
    fn shaping_without_token_is_identity() {
        assert_eq!(shape_reasoning("sin cita", 2), "sin cita");
        assert_eq!(shape_reasoning("", 2), "");
    }

    #[test]
    fn trailing_token_yields_empty_paragraph() {
        assert_eq!(shape_reasoning("x > ", 2), "🤔 Proceso de razonamiento:\n\n> ");
    }
}
