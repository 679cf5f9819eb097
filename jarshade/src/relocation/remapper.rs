use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    jar::{analysis::scanner::strip_version_prefix, core::SymbolMapper},
    relocation::Relocator,
};

lazy_static! {
    /// `[[Lorg/foo/Bar;` and friends
    static ref OBJECT_DESCRIPTOR: Regex = Regex::new(r"^(\[*)?L(.+);$").unwrap();
}

/// Applies an ordered relocator list to names found while rewriting one
/// class. The first relocator that accepts a name wins.
#[derive(Debug, Clone, Copy)]
pub struct Remapper<'r> {
    relocators: &'r [Relocator],
}

impl<'r> Remapper<'r> {
    pub fn new(relocators: &'r [Relocator]) -> Self {
        Self { relocators }
    }

    pub fn has_relocators(&self) -> bool {
        !self.relocators.is_empty()
    }

    /// Maps a name as a path, or as a dotted class name as well when
    /// `map_packages` is set. Descriptor-wrapped names keep their wrapper.
    fn map_entity(&self, name: &str, map_paths: bool, map_packages: bool) -> String {
        let (prefix, inner, suffix) = match OBJECT_DESCRIPTOR.captures(name) {
            Some(caps) => {
                let dims = caps.get(1).map_or("", |m| m.as_str());
                let inner = caps.get(2).map_or(name, |m| m.as_str());
                (format!("{dims}L"), inner, ";")
            }
            None => (String::new(), name, ""),
        };

        for relocator in self.relocators {
            if map_packages && relocator.can_relocate_class(inner) {
                return format!("{prefix}{}{suffix}", relocator.relocate_class(inner));
            } else if map_paths && relocator.can_relocate_path(inner) {
                return format!("{prefix}{}{suffix}", relocator.relocate_path(inner));
            }
        }
        name.to_owned()
    }

    /// Internal class name (`org/foo/Bar`, or an array descriptor of one)
    pub fn map(&self, name: &str) -> String {
        self.map_entity(name, true, false)
    }

    /// String constant. Dotted class names are tried before paths for each
    /// relocator.
    pub fn map_value(&self, value: &str) -> String {
        self.map_entity(value, true, true)
    }

    /// Archive entry path. Multi-release entries are relocated on the part
    /// after `META-INF/versions/<n>/`.
    pub fn map_path(&self, path: &str) -> String {
        let rest = strip_version_prefix(path);
        if rest.len() == path.len() {
            return self.map(path);
        }
        let prefix = &path[..path.len() - rest.len()];
        format!("{prefix}{}", self.map(rest))
    }

    /// Output name of a class entry
    pub fn map_class_entry(&self, entry: &str) -> String {
        match entry.strip_suffix(".class") {
            Some(stem) => format!("{}.class", self.map_path(stem)),
            None => self.map_path(entry),
        }
    }
}

impl SymbolMapper for Remapper<'_> {
    fn map_class_name(&self, name: &str) -> Option<String> {
        let mapped = self.map(name);
        (mapped != name).then_some(mapped)
    }

    fn map_string(&self, value: &str) -> Option<String> {
        let mapped = self.map_value(value);
        (mapped != value).then_some(mapped)
    }

    fn map_source_file(&self, class_name: &str, source: &str) -> Option<String> {
        let package = class_name
            .rfind('/')
            .map_or("", |slash| &class_name[..=slash]);
        let mapped = self.map(&format!("{package}{source}"));
        let file_name = mapped.rsplit('/').next().unwrap_or(&mapped);
        (file_name != source).then(|| file_name.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relocation::RelocationRule;

    fn relocators() -> Vec<Relocator> {
        vec![
            Relocator::package("org.foo", "shaded.org.foo").unwrap(),
            Relocator::package("org", "other.org").unwrap(),
        ]
    }

    #[test]
    fn first_matching_relocator_wins() {
        let relocators = relocators();
        let remapper = Remapper::new(&relocators);
        assert_eq!(remapper.map("org/foo/A"), "shaded/org/foo/A");
        assert_eq!(remapper.map("org/bar/B"), "other/org/bar/B");
        assert_eq!(remapper.map("com/x/C"), "com/x/C");
    }

    #[test]
    fn descriptor_wrapper_is_kept() {
        let relocators = relocators();
        let remapper = Remapper::new(&relocators);
        assert_eq!(remapper.map("[[Lorg/foo/A;"), "[[Lshaded/org/foo/A;");
        assert_eq!(remapper.map_value("Lorg/foo/A;"), "Lshaded/org/foo/A;");
    }

    #[test]
    fn values_may_be_dotted_or_slashed() {
        let relocators = relocators();
        let remapper = Remapper::new(&relocators);
        assert_eq!(remapper.map_value("org.foo.Plugin"), "shaded.org.foo.Plugin");
        assert_eq!(
            remapper.map_value("org/foo/app.properties"),
            "shaded/org/foo/app.properties"
        );
        assert_eq!(remapper.map_value("Hello, world"), "Hello, world");
        // Dotted names are never path-mapped by `map`
        assert_eq!(remapper.map("org.foo.Plugin"), "org.foo.Plugin");
    }

    #[test]
    fn multi_release_prefix_is_preserved() {
        let relocators = relocators();
        let remapper = Remapper::new(&relocators);
        assert_eq!(
            remapper.map_class_entry("META-INF/versions/11/org/foo/A.class"),
            "META-INF/versions/11/shaded/org/foo/A.class"
        );
        assert_eq!(remapper.map_class_entry("org/foo/A.class"), "shaded/org/foo/A.class");
    }

    #[test]
    fn source_file_follows_its_class() {
        let relocators = vec![Relocator::new(&RelocationRule {
            pattern: Some("org.foo".into()),
            shaded_pattern: Some("shaded.org.foo".into()),
            excludes: vec!["org.foo.Keep".into()],
            ..Default::default()
        })
        .unwrap()];
        let remapper = Remapper::new(&relocators);
        assert_eq!(remapper.map_source_file("org/foo/A", "A.java"), None);

        let relocators = vec![Relocator::new(&RelocationRule {
            pattern: Some("org.foo.A".into()),
            shaded_pattern: Some("org.foo.Renamed".into()),
            ..Default::default()
        })
        .unwrap()];
        let remapper = Remapper::new(&relocators);
        assert_eq!(
            remapper.map_source_file("org/foo/A", "A.java").as_deref(),
            Some("Renamed.java")
        );
    }

    #[test]
    fn no_relocators_is_identity() {
        let remapper = Remapper::new(&[]);
        assert!(!remapper.has_relocators());
        assert_eq!(remapper.map_class_entry("a/B.class"), "a/B.class");
        assert_eq!(remapper.map_value("a.B"), "a.B");
    }
}
