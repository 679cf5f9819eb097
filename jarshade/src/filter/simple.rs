use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use crate::{
    filter::Filter,
    pattern::{PathPatterns, PatternError},
};

/// Include/exclude glob filter bound to a set of input archives.
///
/// An entry passes when it matches an include (or there are no includes)
/// and matches no exclude. With `exclude_defaults` off, entries that match
/// no include pass as well.
#[derive(Debug, Clone)]
pub struct SimpleFilter {
    archives: BTreeSet<PathBuf>,
    includes: PathPatterns,
    excludes: PathPatterns,
    exclude_defaults: bool,
}

impl SimpleFilter {
    pub fn new<S: AsRef<str>>(
        archives: impl IntoIterator<Item = PathBuf>,
        includes: &[S],
        excludes: &[S],
    ) -> Result<Self, PatternError> {
        Ok(Self {
            archives: archives.into_iter().collect(),
            includes: PathPatterns::new(normalize_patterns(includes))?,
            excludes: PathPatterns::new(normalize_patterns(excludes))?,
            exclude_defaults: true,
        })
    }

    pub fn with_exclude_defaults(mut self, exclude_defaults: bool) -> Self {
        self.exclude_defaults = exclude_defaults;
        self
    }

    /// Whether the entry matches one of the configured includes. False when
    /// there are none.
    pub fn is_specifically_included(&self, entry: &str) -> bool {
        !self.includes.is_empty() && self.includes.matches_any(&normalize_path(entry))
    }

    fn is_included(&self, path: &str) -> bool {
        self.includes.is_empty() || self.includes.matches_any(path)
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excludes.matches_any(path)
    }
}

impl Filter for SimpleFilter {
    fn can_filter(&self, archive: &Path) -> bool {
        self.archives.contains(archive)
    }

    fn is_filtered(&self, entry: &str) -> bool {
        let path = normalize_path(entry);
        let included = !self.exclude_defaults || self.is_included(&path);
        !(included && !self.is_excluded(&path))
    }
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

fn normalize_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| {
            let mut pattern = normalize_path(p.as_ref());
            if pattern.ends_with('/') {
                pattern.push_str("**");
            }
            pattern
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(includes: &[&str], excludes: &[&str]) -> SimpleFilter {
        SimpleFilter::new([PathBuf::from("lib.jar")], includes, excludes).unwrap()
    }

    #[test]
    fn applies_only_to_its_archives() {
        let f = filter(&[], &[]);
        assert!(f.can_filter(Path::new("lib.jar")));
        assert!(!f.can_filter(Path::new("other.jar")));
    }

    #[test]
    fn excludes_win_over_includes() {
        let f = filter(&["org/foo/**"], &["org/foo/internal/**"]);
        assert!(!f.is_filtered("org/foo/Api.class"));
        assert!(f.is_filtered("org/foo/internal/Impl.class"));
        assert!(f.is_filtered("org/bar/Other.class"));
    }

    #[test]
    fn no_includes_means_everything_is_included() {
        let f = filter(&[], &["META-INF/*.SF", "META-INF/*.DSA"]);
        assert!(!f.is_filtered("org/foo/A.class"));
        assert!(f.is_filtered("META-INF/SIGNER.SF"));
    }

    #[test]
    fn trailing_slash_and_backslashes_are_normalized() {
        let f = filter(&[], &["org\\foo\\"]);
        assert!(f.is_filtered("org/foo/deep/A.class"));
        assert!(f.is_filtered("org\\foo\\A.class"));
    }

    #[test]
    fn lenient_mode_keeps_unmatched_entries() {
        let f = filter(&["org/foo/**"], &["org/foo/X.class"]).with_exclude_defaults(false);
        assert!(!f.is_filtered("org/bar/Other.class"));
        assert!(f.is_filtered("org/foo/X.class"));
    }

    #[test]
    fn specific_inclusion_needs_includes() {
        assert!(!filter(&[], &[]).is_specifically_included("org/foo/A"));
        assert!(filter(&["org/foo/*"], &[]).is_specifically_included("org/foo/A"));
    }
}
