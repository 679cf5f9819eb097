use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    pattern::{PathPatterns, PatternError},
    relocation::source::SourceShader,
};

/// One relocation as configured by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelocationRule {
    /// Package to move, dotted or slashed. A regex in raw mode.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Where it goes. Defaults to `hidden.<pattern>`.
    #[serde(default)]
    pub shaded_pattern: Option<String>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Use `pattern`/`shaded_pattern` as a regex and its replacement,
    /// applied to paths only.
    #[serde(default)]
    pub raw_string: bool,
}

impl RelocationRule {
    pub fn new(pattern: impl Into<String>, shaded_pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            shaded_pattern: Some(shaded_pattern.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Raw {
        pattern: Regex,
        replacement: String,
    },
    Package {
        pattern: String,
        path_pattern: String,
        shaded_pattern: String,
        shaded_path_pattern: String,
        includes: PathPatterns,
        excludes: PathPatterns,
        dotted_source: SourceShader,
        path_source: SourceShader,
    },
}

/// Compiled relocation rule
#[derive(Debug, Clone)]
pub struct Relocator {
    mode: Mode,
}

impl Relocator {
    pub fn new(rule: &RelocationRule) -> Result<Self, PatternError> {
        if rule.raw_string {
            let pattern = rule.pattern.clone().unwrap_or_default();
            let regex = Regex::new(&pattern).map_err(|source| PatternError::Regex {
                pattern: pattern.clone(),
                source,
            })?;
            return Ok(Self {
                mode: Mode::Raw {
                    pattern: regex,
                    replacement: rule.shaded_pattern.clone().unwrap_or_default(),
                },
            });
        }

        let source = rule.pattern.as_deref().unwrap_or_default();
        let pattern = source.replace('/', ".");
        let path_pattern = source.replace('.', "/");
        let (shaded_pattern, shaded_path_pattern) = match rule.shaded_pattern.as_deref() {
            Some(shaded) => (shaded.replace('/', "."), shaded.replace('.', "/")),
            None => (format!("hidden.{pattern}"), format!("hidden/{path_pattern}")),
        };

        let includes = normalize_patterns(&rule.includes);
        let excludes = normalize_patterns(&rule.excludes);

        let dotted_source = SourceShader::new(&pattern, &shaded_pattern, &excludes, '.')?;
        let path_source = SourceShader::new(&path_pattern, &shaded_path_pattern, &excludes, '/')?;

        Ok(Self {
            mode: Mode::Package {
                pattern,
                path_pattern,
                shaded_pattern,
                shaded_path_pattern,
                includes: PathPatterns::new(&includes)?,
                excludes: PathPatterns::new(&excludes)?,
                dotted_source,
                path_source,
            },
        })
    }

    /// Shorthand for a package move without includes or excludes
    pub fn package(pattern: &str, shaded_pattern: &str) -> Result<Self, PatternError> {
        Self::new(&RelocationRule::new(pattern, shaded_pattern))
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.mode, Mode::Raw { .. })
    }

    pub fn can_relocate_path(&self, path: &str) -> bool {
        match &self.mode {
            Mode::Raw { pattern, .. } => pattern.is_match(path),
            Mode::Package {
                path_pattern,
                includes,
                excludes,
                ..
            } => {
                let path = path.strip_suffix(".class").unwrap_or(path);
                // Resource lookups sometimes use an absolute `/a/b/c.properties`
                let path = path.strip_prefix('/').unwrap_or(path);
                (includes.is_empty() || includes.matches_any(path))
                    && !excludes.matches_any(path)
                    && path.starts_with(path_pattern.as_str())
            }
        }
    }

    pub fn can_relocate_class(&self, class: &str) -> bool {
        !self.is_raw() && !class.contains('/') && self.can_relocate_path(&class.replace('.', "/"))
    }

    pub fn relocate_path(&self, path: &str) -> String {
        match &self.mode {
            Mode::Raw {
                pattern,
                replacement,
            } => pattern.replace_all(path, replacement.as_str()).into_owned(),
            Mode::Package {
                path_pattern,
                shaded_path_pattern,
                ..
            } => path.replacen(path_pattern.as_str(), shaded_path_pattern, 1),
        }
    }

    pub fn relocate_class(&self, class: &str) -> String {
        match &self.mode {
            Mode::Raw { .. } => class.to_owned(),
            Mode::Package {
                pattern,
                shaded_pattern,
                ..
            } => class.replacen(pattern.as_str(), shaded_pattern, 1),
        }
    }

    /// Relocates the package in Java source text, both as a dotted name and
    /// as a path.
    pub fn apply_to_source_content(&self, content: &str) -> String {
        match &self.mode {
            Mode::Raw { .. } => content.to_owned(),
            Mode::Package {
                dotted_source,
                path_source,
                ..
            } => path_source.apply(&dotted_source.apply(content)),
        }
    }
}

impl fmt::Display for Relocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mode {
            Mode::Raw {
                pattern,
                replacement,
            } => write!(f, "{} -> {} (raw)", pattern.as_str(), replacement),
            Mode::Package {
                pattern,
                shaded_pattern,
                ..
            } => write!(f, "{pattern} -> {shaded_pattern}"),
        }
    }
}

/// Slash form of every pattern, plus the bare package for `pkg/*` and
/// `pkg/**`, plus the patterns as written.
fn normalize_patterns(patterns: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(patterns.len() * 3);
    let mut add = |p: String| {
        if !normalized.contains(&p) {
            normalized.push(p);
        }
    };

    for pattern in patterns {
        if pattern.starts_with("%regex[") {
            add(pattern.clone());
            continue;
        }
        let mut class_pattern = pattern.replace('.', "/");
        if class_pattern.ends_with('/') {
            class_pattern.push_str("**");
        }
        if class_pattern.ends_with("/*") || class_pattern.ends_with("/**") {
            if let Some((package, _)) = class_pattern.rsplit_once('/') {
                add(package.to_owned());
            }
        }
        add(class_pattern);
    }

    // Dots stay dots here so resource paths like `META-INF/maven/org.foo`
    // can still be matched
    for pattern in patterns {
        add(pattern.clone());
    }

    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, shaded: &str, includes: &[&str], excludes: &[&str]) -> Relocator {
        Relocator::new(&RelocationRule {
            pattern: Some(pattern.into()),
            shaded_pattern: Some(shaded.into()),
            includes: includes.iter().map(|s| s.to_string()).collect(),
            excludes: excludes.iter().map(|s| s.to_string()).collect(),
            raw_string: false,
        })
        .unwrap()
    }

    #[test]
    fn path_prefix_decides() {
        let r = rule("org.foo", "hidden.org.foo", &[], &[]);
        assert!(r.can_relocate_path("org/foo/Bar.class"));
        assert!(r.can_relocate_path("/org/foo/bar.properties"));
        assert!(r.can_relocate_path("org/foobar/X"));
        assert!(!r.can_relocate_path("com/org/foo/Bar"));
        assert!(!r.can_relocate_path("org/Foo/Bar"));
        assert!(!r.can_relocate_path("//org/foo/Bar"));
    }

    #[test]
    fn classes_must_be_dotted() {
        let r = rule("org.foo", "hidden.org.foo", &[], &[]);
        assert!(r.can_relocate_class("org.foo.Bar"));
        assert!(!r.can_relocate_class("org/foo/Bar"));
        assert_eq!(r.relocate_class("org.foo.bar.Class"), "hidden.org.foo.bar.Class");
        assert_eq!(r.relocate_path("org/foo/bar/Class"), "hidden/org/foo/bar/Class");
    }

    #[test]
    fn only_first_occurrence_is_replaced() {
        let r = rule("a", "b", &[], &[]);
        assert_eq!(r.relocate_path("a/x/a/y"), "b/x/a/y");
        assert_eq!(r.relocate_class("a.x.a.y"), "b.x.a.y");
    }

    #[test]
    fn excludes_beat_includes() {
        let r = rule(
            "org.foo",
            "shaded.org.foo",
            &["org.foo.*"],
            &["org.foo.Internal"],
        );
        assert!(r.can_relocate_class("org.foo.Api"));
        assert!(!r.can_relocate_class("org.foo.Internal"));
        assert!(!r.can_relocate_class("org.foo.sub.Deep"));
    }

    #[test]
    fn double_star_includes_sub_packages_and_package_itself() {
        let r = rule("org.foo", "shaded.org.foo", &["org/foo/**"], &[]);
        assert!(r.can_relocate_path("org/foo/sub/Deep.class"));
        assert!(r.can_relocate_path("org/foo"));
        assert!(!r.can_relocate_path("org/foobar/X"));
    }

    #[test]
    fn trailing_slash_means_everything_below() {
        let r = rule("org.foo", "shaded.org.foo", &[], &["org/foo/impl/"]);
        assert!(!r.can_relocate_path("org/foo/impl/deep/X.class"));
        assert!(!r.can_relocate_path("org/foo/impl"));
        assert!(r.can_relocate_path("org/foo/api/X.class"));
    }

    #[test]
    fn missing_patterns_do_not_fail() {
        let r = Relocator::new(&RelocationRule {
            pattern: Some("org.foo".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(r.relocate_class("org.foo.A"), "hidden.org.foo.A");
        assert_eq!(r.relocate_path("org/foo/A"), "hidden/org/foo/A");

        let r = Relocator::new(&RelocationRule::default()).unwrap();
        assert!(r.can_relocate_path("anything"));
        assert_eq!(r.relocate_path("x/Y"), "hidden/x/Y");
    }

    #[test]
    fn raw_mode_uses_regex() {
        let r = Relocator::new(&RelocationRule {
            pattern: Some("^META-INF/org.foo.xml$".into()),
            shaded_pattern: Some("META-INF/hidden.org.foo.xml".into()),
            raw_string: true,
            ..Default::default()
        })
        .unwrap();
        assert!(r.can_relocate_path("META-INF/org.foo.xml"));
        assert!(!r.can_relocate_path("META-INF/org.foo.xml.bak"));
        assert_eq!(
            r.relocate_path("META-INF/org.foo.xml"),
            "META-INF/hidden.org.foo.xml"
        );
        assert!(!r.can_relocate_class("org.foo.Bar"));
        assert_eq!(r.relocate_class("org.foo.Bar"), "org.foo.Bar");
        assert_eq!(r.apply_to_source_content("org.foo"), "org.foo");
    }

    #[test]
    fn raw_mode_replaces_every_match() {
        let r = Relocator::new(&RelocationRule {
            pattern: Some("foo".into()),
            shaded_pattern: Some("bar".into()),
            raw_string: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(r.relocate_path("foo/x/foo"), "bar/x/bar");
    }

    #[test]
    fn rules_deserialize_from_camel_case() {
        let rule: RelocationRule = serde_json::from_str(
            r#"{"pattern": "org.foo", "shadedPattern": "x.org.foo", "excludes": ["org.foo.A"]}"#,
        )
        .unwrap();
        assert_eq!(rule.shaded_pattern.as_deref(), Some("x.org.foo"));
        assert!(!rule.raw_string);
        assert!(rule.includes.is_empty());
    }
}
