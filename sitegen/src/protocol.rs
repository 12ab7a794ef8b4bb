//! The three-part response convention generated content is instructed to
//! follow: an analysis, the page markup, and a summary, each wrapped in
//! start/end markers.
//!
//! The server relays raw text and never parses it. [`SectionParser`] is for
//! consumers (the CLI `generate` command, UIs) that want the sections back.

pub const ANALYSIS_START: &str = "===ANALYSIS_START===";
pub const ANALYSIS_END: &str = "===ANALYSIS_END===";
pub const CODE_START: &str = "===CODE_START===";
pub const CODE_END: &str = "===CODE_END===";
pub const SUMMARY_START: &str = "===SUMMARY_START===";
pub const SUMMARY_END: &str = "===SUMMARY_END===";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    Analysis,
    Code,
    Summary,
}

impl Section {
    pub fn markers(self) -> (&'static str, &'static str) {
        match self {
            Section::Analysis => (ANALYSIS_START, ANALYSIS_END),
            Section::Code => (CODE_START, CODE_END),
            Section::Summary => (SUMMARY_START, SUMMARY_END),
        }
    }
}

/// Sections recovered from a (possibly partial) response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub analysis: Option<String>,
    pub code: Option<String>,
    pub summary: Option<String>,
}

/// Incremental parser fed with fragments as they arrive.
///
/// Tracks the current phase the way a live UI does: the phase advances when
/// the next section's start marker shows up, never moves backwards.
#[derive(Debug, Default)]
pub struct SectionParser {
    buffer: String,
    phase: Section,
}

impl SectionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the phase after it.
    pub fn push(&mut self, fragment: &str) -> Section {
        self.buffer.push_str(fragment);
        if self.phase != Section::Summary && self.buffer.contains(SUMMARY_START) {
            self.phase = Section::Summary;
        } else if self.phase == Section::Analysis && self.buffer.contains(CODE_START) {
            self.phase = Section::Code;
        }
        self.phase
    }

    pub fn phase(&self) -> Section {
        self.phase
    }

    pub fn raw(&self) -> &str {
        &self.buffer
    }

    /// Text of the current phase so far, without waiting for its end marker.
    pub fn partial(&self) -> Option<&str> {
        partial_section(&self.buffer, self.phase)
    }

    /// Sections whose end markers have been seen.
    pub fn complete(&self) -> Sections {
        split_sections(&self.buffer)
    }
}

/// Text between a section's markers, trimmed. `None` unless both markers are present.
pub fn extract(text: &str, section: Section) -> Option<&str> {
    let (start, end) = section.markers();
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(text[from..from + len].trim())
}

/// Text after a section's start marker up to its end marker or the end of input.
pub fn partial_section(text: &str, section: Section) -> Option<&str> {
    let (start, end) = section.markers();
    let from = text.find(start)? + start.len();
    let rest = &text[from..];
    let upto = rest.find(end).unwrap_or(rest.len());
    Some(rest[..upto].trim())
}

pub fn split_sections(text: &str) -> Sections {
    Sections {
        analysis: extract(text, Section::Analysis).map(String::from),
        code: extract(text, Section::Code).map(String::from),
        summary: extract(text, Section::Summary).map(String::from),
    }
}
