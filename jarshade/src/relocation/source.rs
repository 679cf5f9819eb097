//! Textual relocation of Java sources.
//!
//! Best effort: occurrences of the package are found with a word-boundary
//! regex and no parsing happens, so string literals and comments are
//! rewritten like code. Occurrences directly after `.`, `/` or a space are
//! left alone, except after a declaration keyword, `{@link ...}` or
//! `@throws`/`@exception`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::pattern::PatternError;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref ENDS_WITH_DOT_SLASH_SPACE: Regex = Regex::new(r"[./ ]$").unwrap();
    static ref ENDS_WITH_JAVA_KEYWORD: Regex = Regex::new(concat!(
        r"\b(import|package|public|protected|private|static|final|synchronized|abstract|volatile|extends|implements|throws) $",
        r"|\{@link( \S+)? $",
        r"|@(throws|exception)( \S+)? $",
    ))
    .unwrap();
}

/// Rewrites one spelling (dotted or slashed) of a package in source text
#[derive(Debug, Clone)]
pub struct SourceShader {
    from: String,
    to: String,
    matcher: Option<Regex>,
    /// Text that, right after a match, marks an excluded sub-package
    excluded_suffixes: Vec<String>,
}

impl SourceShader {
    /// `excludes` are relocation exclude patterns; those under `from`
    /// become sub-package exclusions with their trailing `<sep>*` removed.
    pub fn new(
        from: &str,
        to: &str,
        excludes: &[String],
        separator: char,
    ) -> Result<Self, PatternError> {
        let matcher = if from.is_empty() {
            None
        } else {
            let expr = format!(r"\b{}\b", regex::escape(from));
            Some(Regex::new(&expr).map_err(|source| PatternError::Regex {
                pattern: from.to_owned(),
                source,
            })?)
        };

        let wildcard = format!("{separator}*");
        let mut excluded_suffixes = Vec::new();
        for exclude in excludes {
            let Some(rest) = exclude.strip_prefix(from) else {
                continue;
            };
            let rest = rest.strip_suffix(wildcard.as_str()).unwrap_or(rest);
            if !excluded_suffixes.iter().any(|s| s == rest) {
                excluded_suffixes.push(rest.to_owned());
            }
        }

        Ok(Self {
            from: from.to_owned(),
            to: to.to_owned(),
            matcher,
            excluded_suffixes,
        })
    }

    pub fn apply(&self, content: &str) -> String {
        let Some(matcher) = &self.matcher else {
            return content.to_owned();
        };

        let snippets: Vec<&str> = matcher.split(content).collect();
        let mut out = String::with_capacity(content.len() * 11 / 10);
        out.push_str(snippets[0]);

        for pair in snippets.windows(2) {
            let (previous, snippet) = (pair[0], pair[1]);
            let excluded = self
                .excluded_suffixes
                .iter()
                .any(|suffix| snippet.starts_with(suffix.as_str()));

            let previous = WHITESPACE.replace_all(previous, " ");
            let after_separator = ENDS_WITH_DOT_SLASH_SPACE.is_match(&previous);
            let after_keyword = ENDS_WITH_JAVA_KEYWORD.is_match(&previous);

            if excluded || (after_separator && !after_keyword) {
                out.push_str(&self.from);
            } else {
                out.push_str(&self.to);
            }
            out.push_str(snippet);
        }

        out
    }
}
