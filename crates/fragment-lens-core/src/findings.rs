//! Notable-sentence extraction.
//!
//! A cheap lexical heuristic: marker phrases ("key finding", "important",
//! "critical", "recommendation", "issue") followed by an optional `:`/`-`
//! and a clause running to the next sentence terminator or line break.
//! Deterministic and side-effect free; no recall or precision guarantees.

use regex::Regex;
use std::sync::OnceLock;

/// Maximum number of snippets returned per text.
pub const MAX_FINDINGS: usize = 5;

const PATTERNS: [&str; 5] = [
    r"(?i)key findings?[:\-]?\s*([^.!?\n]+)",
    r"(?i)important[:\-]?\s*([^.!?\n]+)",
    r"(?i)critical[:\-]?\s*([^.!?\n]+)",
    r"(?i)recommendations?[:\-]?\s*([^.!?\n]+)",
    r"(?i)issues?[:\-]?\s*([^.!?\n]+)",
];

fn patterns() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Extract up to [`MAX_FINDINGS`] notable snippets from `text`.
///
/// Captures are trimmed and kept when their length is strictly between 10
/// and 200 chars. Results follow pattern order, then match order.
pub fn extract_findings(text: &str) -> Vec<String> {
    let mut findings = Vec::new();

    for re in patterns() {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let finding = m.as_str().trim();
            let len = finding.chars().count();
            if len > 10 && len < 200 {
                findings.push(finding.to_string());
                if findings.len() == MAX_FINDINGS {
                    return findings;
                }
            }
        }
    }

    findings
}
