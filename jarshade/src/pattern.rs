//! Ant-style path patterns.
//!
//! `*` and `?` stay inside one path segment, `**` spans any number of
//! segments (including none, so `org/foo/**` also matches `org/foo`).
//! Patterns written as `%regex[...]` are matched as a whole-path regex.
//! Matching is case-sensitive.

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid path pattern `{pattern}`: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("Invalid regular expression `{pattern}`: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
enum Matcher {
    Glob {
        glob: GlobMatcher,
        /// `x` for a pattern `x/**`
        bare: Option<GlobMatcher>,
    },
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub struct AntPattern {
    raw: String,
    matcher: Matcher,
}

impl AntPattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let matcher = match pattern
            .strip_prefix("%regex[")
            .and_then(|p| p.strip_suffix(']'))
        {
            Some(expr) => Matcher::Regex(Regex::new(&format!("^(?:{expr})$")).map_err(
                |source| PatternError::Regex {
                    pattern: pattern.to_owned(),
                    source,
                },
            )?),
            None => {
                let pattern = pattern
                    .strip_prefix("%ant[")
                    .and_then(|p| p.strip_suffix(']'))
                    .unwrap_or(pattern);
                let glob_text = to_glob(pattern);
                let bare = match glob_text.strip_suffix("/**") {
                    Some(prefix) if !prefix.is_empty() => Some(compile(prefix, pattern)?),
                    _ => None,
                };
                Matcher::Glob {
                    glob: compile(&glob_text, pattern)?,
                    bare,
                }
            }
        };
        Ok(Self {
            raw: pattern.to_owned(),
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Glob { glob, bare } => {
                glob.is_match(path) || bare.as_ref().is_some_and(|b| b.is_match(path))
            }
            Matcher::Regex(regex) => regex.is_match(path),
        }
    }
}

fn compile(glob: &str, pattern: &str) -> Result<GlobMatcher, PatternError> {
    GlobBuilder::new(glob)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|source| PatternError::Glob {
            pattern: pattern.to_owned(),
            source,
        })
}

/// Escapes characters that are literal in Ant but special to globset, and
/// demotes a `**` that shares its segment with other text to `*`.
fn to_glob(pattern: &str) -> String {
    let segments: Vec<String> = pattern
        .split('/')
        .map(|segment| {
            if segment == "**" {
                return segment.to_owned();
            }
            let mut out = String::with_capacity(segment.len());
            let mut prev_star = false;
            for c in segment.chars() {
                match c {
                    '*' if prev_star => continue,
                    '[' | ']' | '{' | '}' | '\\' => {
                        out.push('\\');
                        out.push(c);
                    }
                    _ => out.push(c),
                }
                prev_star = c == '*';
            }
            out
        })
        .collect();
    segments.join("/")
}

/// A set of patterns, matching when any member does
#[derive(Debug, Clone, Default)]
pub struct PathPatterns {
    patterns: Vec<AntPattern>,
}

impl PathPatterns {
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| AntPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches_any(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AntPattern> {
        self.patterns.iter()
    }
}
