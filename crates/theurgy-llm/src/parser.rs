//! Splits generated text into dialogue and command candidates.
//!
//! A line is a command candidate when it starts with `/` (the whole trimmed
//! line is the candidate) or contains the marker `command:` in any case (the
//! trimmed text after the first marker is the candidate). A marker with
//! nothing after it yields no candidate. Every other non-empty line joins the
//! dialogue, space-separated. Empty dialogue is replaced by
//! [`FALLBACK_DIALOGUE`].

/// Dialogue substituted when the reply contains none.
pub const FALLBACK_DIALOGUE: &str = "The deity acknowledges your prayer.";

const MARKER: &str = "command:";

/// Dialogue and ordered command candidates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedResponse {
    /// User-facing text. Never empty.
    pub dialogue: String,
    /// Candidate command strings in reply order.
    pub commands: Vec<String>,
}

/// Parse raw generated text.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let mut dialogue: Vec<&str> = Vec::new();
    let mut commands = Vec::new();

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with('/') {
            commands.push(line.to_string());
        } else if let Some(pos) = line.to_ascii_lowercase().find(MARKER) {
            // ASCII lowercasing keeps byte offsets aligned with `line`.
            let candidate = line[pos + MARKER.len()..].trim();
            if !candidate.is_empty() {
                commands.push(candidate.to_string());
            }
        } else {
            dialogue.push(line);
        }
    }

    let dialogue = if dialogue.is_empty() {
        FALLBACK_DIALOGUE.to_string()
    } else {
        dialogue.join(" ")
    };
    ParsedResponse { dialogue, commands }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
