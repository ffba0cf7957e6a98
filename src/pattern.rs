//! Compiles a single route template segment into a matcher.
//!
//! A segment is one of:
//! - a literal, compared byte for byte (`users`)
//! - a capture, written `${name}` or `${name="regex"}`, possibly surrounded
//!   by literal text (`v${major="\d+"}`)
//! - the wildcard `*`, matching any single segment

use crate::error::ConfigError;
use regex::Regex;
use std::sync::OnceLock;

/// Raw text of the wildcard segment.
pub const WILDCARD: &str = "*";

/// Opening of a capture. Left over in literal text it means a missing `}`.
const CAPTURE_OPEN: &str = "${";

/// Condition applied to captures declared without one.
const DEFAULT_CONDITION: &str = ".+?";

static CAPTURE_REGEX: OnceLock<Regex> = OnceLock::new();

fn capture_regex() -> &'static Regex {
    CAPTURE_REGEX.get_or_init(|| {
        Regex::new(r#"\$\{(?P<name>[^=}]*?)(?:="(?P<condition>.*?)")?\}"#)
            .expect("Failed to compile capture regex")
    })
}

/// How a segment is matched against a request path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Literal,
    Capture,
    Wildcard,
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal,
    Capture { regex: Regex, names: Vec<String> },
    Wildcard,
}

/// A compiled route template segment.
#[derive(Debug, Clone)]
pub struct Segment {
    raw: String,
    matcher: Matcher,
}

impl Segment {
    /// Compile one raw segment. Malformed captures are configuration errors.
    pub fn compile(raw: &str) -> Result<Self, ConfigError> {
        if raw == WILDCARD {
            return Ok(Self {
                raw: raw.to_string(),
                matcher: Matcher::Wildcard,
            });
        }

        let mut formatted = String::from("^");
        let mut names = Vec::new();
        let mut literal_text = String::new();
        let mut last = 0;

        for caps in capture_regex().captures_iter(raw) {
            let Some(whole) = caps.get(0) else {
                continue;
            };

            let name = caps.name("name").map(|m| m.as_str().trim()).unwrap_or("");
            if name.is_empty() {
                return Err(ConfigError::UnnamedCapture {
                    segment: raw.to_string(),
                });
            }

            let condition = caps
                .name("condition")
                .map(|m| m.as_str())
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_CONDITION);

            let prefix = &raw[last..whole.start()];
            literal_text.push_str(prefix);
            formatted.push_str(&regex::escape(prefix));
            formatted.push_str(&format!("(?P<{}>{})", name, condition));

            names.push(name.to_string());
            last = whole.end();
        }

        let suffix = &raw[last..];
        literal_text.push_str(suffix);
        if literal_text.contains(CAPTURE_OPEN) {
            return Err(ConfigError::UnterminatedCapture {
                segment: raw.to_string(),
            });
        }

        if names.is_empty() {
            return Ok(Self {
                raw: raw.to_string(),
                matcher: Matcher::Literal,
            });
        }

        formatted.push_str(&regex::escape(suffix));
        formatted.push('$');

        if literal_text.contains(WILDCARD) {
            return Err(ConfigError::WildcardCapture {
                segment: raw.to_string(),
            });
        }

        let regex = Regex::new(&formatted).map_err(|source| ConfigError::InvalidPattern {
            segment: raw.to_string(),
            source,
        })?;

        Ok(Self {
            raw: raw.to_string(),
            matcher: Matcher::Capture { regex, names },
        })
    }

    /// The empty literal segment of the tree root.
    pub(crate) fn root() -> Self {
        Self {
            raw: String::new(),
            matcher: Matcher::Literal,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> MatchKind {
        match self.matcher {
            Matcher::Literal => MatchKind::Literal,
            Matcher::Capture { .. } => MatchKind::Capture,
            Matcher::Wildcard => MatchKind::Wildcard,
        }
    }

    /// Names bound by this segment, in declaration order.
    pub fn capture_names(&self) -> &[String] {
        match &self.matcher {
            Matcher::Capture { names, .. } => names,
            _ => &[],
        }
    }

    /// The anchored regex of a capture segment.
    pub fn regex(&self) -> Option<&Regex> {
        match &self.matcher {
            Matcher::Capture { regex, .. } => Some(regex),
            _ => None,
        }
    }

    /// Match a request path segment, returning the bound parameters.
    ///
    /// Literal and wildcard segments bind nothing.
    pub fn matches(&self, value: &str) -> Option<Vec<(String, String)>> {
        match &self.matcher {
            Matcher::Literal => (self.raw == value).then(Vec::new),
            Matcher::Wildcard => Some(Vec::new()),
            Matcher::Capture { regex, names } => {
                let caps = regex.captures(value)?;
                Some(
                    names
                        .iter()
                        .filter_map(|name| {
                            caps.name(name)
                                .map(|m| (name.clone(), m.as_str().to_string()))
                        })
                        .collect(),
                )
            }
        }
    }
}

/// Split a template or request path into its non-empty segments.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}
