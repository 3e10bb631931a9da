use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};

const MAX_LINE_CHARS: usize = 4096;

#[derive(Clone, Copy)]
enum Escape {
    Start,
    Csi,
    Osc,
    OscEsc,
    String,
    StringEsc,
}

/// Strip terminal escapes and control characters from one line of
/// collaborator output so it is safe to print and to write to the run log.
pub fn sanitize_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LINE_CHARS));
    let mut escape: Option<Escape> = None;
    let mut count = 0usize;

    for c in input.chars() {
        if let Some(state) = escape {
            escape = match (state, c) {
                (Escape::Start, '[') => Some(Escape::Csi),
                (Escape::Start, ']') => Some(Escape::Osc),
                (Escape::Start, 'P' | 'X' | '^' | '_') => Some(Escape::String),
                (Escape::Start, _) => None,
                (Escape::Csi, '@'..='~') => None,
                (Escape::Csi, _) => Some(Escape::Csi),
                (Escape::Osc, '\x07') => None,
                (Escape::Osc, '\x1b') => Some(Escape::OscEsc),
                (Escape::Osc, _) => Some(Escape::Osc),
                (Escape::OscEsc, '\\') => None,
                (Escape::OscEsc, '\x1b') => Some(Escape::OscEsc),
                (Escape::OscEsc, _) => Some(Escape::Osc),
                (Escape::String, '\x1b') => Some(Escape::StringEsc),
                (Escape::String, _) => Some(Escape::String),
                (Escape::StringEsc, '\\') => None,
                (Escape::StringEsc, '\x1b') => Some(Escape::StringEsc),
                (Escape::StringEsc, _) => Some(Escape::String),
            };
            continue;
        }

        match c {
            '\x1b' => escape = Some(Escape::Start),
            '\r' | '\n' => {}
            '\t' => {
                out.push(' ');
                count += 1;
            }
            c if c.is_control() || is_bidi_control(c) => {}
            c => {
                out.push(c);
                count += 1;
            }
        }

        if count >= MAX_LINE_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }

    out
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

/// Regex patterns for collaborator output lines that should not reach the log.
#[derive(Debug, Clone, Default)]
pub struct OutputFilter {
    patterns: Vec<Regex>,
}

impl OutputFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for p in patterns {
            let p = p.as_ref();
            let re = Regex::new(p)
                .map_err(|e| Error::config(format!("invalid ignore pattern '{p}': {e}")))?;
            out.push(re);
        }
        Ok(Self { patterns: out })
    }

    /// Read an ignore list: one pattern per line, blank lines and `#` comments skipped.
    /// A missing file yields an empty filter.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read ignore list {}: {e}", path.display()))
        })?;
        Self::new(
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn ignores(&self, line: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(line))
    }
}
