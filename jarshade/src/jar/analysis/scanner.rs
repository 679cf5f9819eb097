use std::collections::BTreeSet;

use krakatau2::lib::{classfile, classfile::cpool::Const, parse_utf8, ParserOptions};
use thiserror::Error;

use crate::jar::core::descriptor::type_class_names;

const VERSIONS_PREFIX: &str = "META-INF/versions/";

const PARSER_OPTIONS: ParserOptions = ParserOptions {
    no_short_code_attr: true,
};

#[derive(Debug, Error)]
#[error("Class parse error: {0}")]
pub struct ScanError(String);

/// What the minimizer needs to know about one class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSummary {
    /// Internal name, `org/foo/Bar`
    pub name: String,
    /// Internal names of every other class the class refers to
    pub references: BTreeSet<String>,
}

/// Harvests class references from the constant pool: class entries, and
/// every Utf8 entry that reads as a descriptor or generic signature.
/// Member names can never read as one. Utf8 entries used only as string
/// constants are not references.
pub fn scan_class(data: &[u8]) -> Result<ClassSummary, ScanError> {
    let class = classfile::parse(data, PARSER_OPTIONS)
        .map_err(|err| ScanError(format!("{err:?}")))?;
    let cp = &class.cp.0;
    let name = class
        .cp
        .clsutf(class.this)
        .and_then(parse_utf8)
        .unwrap_or_default();

    let mut strings = BTreeSet::new();
    let mut types = BTreeSet::new();
    for entry in cp {
        match entry {
            Const::Str(index) => {
                strings.insert(*index);
            }
            Const::NameAndType(_, desc) => {
                types.insert(*desc);
            }
            _ => {}
        }
    }

    let mut references = BTreeSet::new();
    for (index, entry) in cp.iter().enumerate() {
        match entry {
            Const::Class(name_index) => {
                let Some(text) = class.cp.utf8(*name_index).and_then(parse_utf8) else {
                    continue;
                };
                // Array classes are named by their descriptor
                if text.starts_with('[') {
                    references.extend(type_class_names(&text));
                } else {
                    references.insert(text);
                }
            }
            Const::Utf8(bytes) => {
                let Ok(index) = u16::try_from(index) else {
                    continue;
                };
                if strings.contains(&index) && !types.contains(&index) {
                    continue;
                }
                if let Some(text) = parse_utf8(bytes.0) {
                    references.extend(type_class_names(&text));
                }
            }
            _ => {}
        }
    }
    references.remove(&name);

    Ok(ClassSummary { name, references })
}

/// Dotted class name for a `.class` entry, looking through the
/// multi-release `META-INF/versions/<n>/` prefix.
pub fn class_name_of_entry(entry: &str) -> Option<String> {
    let path = entry.strip_suffix(".class")?;
    let path = strip_version_prefix(path);
    if path.is_empty() {
        return None;
    }
    Some(path.replace('/', "."))
}

/// Part of a multi-release entry path after `META-INF/versions/<n>/`
pub fn strip_version_prefix(path: &str) -> &str {
    path.strip_prefix(VERSIONS_PREFIX)
        .and_then(|rest| rest.split_once('/'))
        .filter(|(version, _)| !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()))
        .map(|(_, rest)| rest)
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jar::core::{
        attributes::AttrBody,
        classfile::{ClassFile, ACC_PUBLIC},
        cpool::Constant,
    };

    #[test]
    fn references_come_from_types_not_strings() {
        let mut class = ClassFile::new(52, "org/app/Main", Some("java/lang/Object"));
        class.add_field(ACC_PUBLIC, "dep", "Lorg/lib/Dep;").unwrap();
        class.add_string_constant("org/lib/NotAReference").unwrap();
        let sig = class
            .pool
            .utf8_index("Ljava/util/List<Lorg/lib/Item;>;")
            .unwrap();
        class
            .add_attribute("Signature", AttrBody::Signature(sig))
            .unwrap();

        class.add_string_constant("Lorg/lib/Quoted;").unwrap();

        let summary = scan_class(&class.to_bytes().unwrap()).unwrap();
        assert_eq!(summary.name, "org/app/Main");
        assert!(summary.references.contains("org/lib/Dep"));
        assert!(summary.references.contains("org/lib/Item"));
        assert!(summary.references.contains("java/lang/Object"));
        assert!(!summary.references.contains("org/lib/NotAReference"));
        assert!(!summary.references.contains("org/lib/Quoted"));
        assert!(!summary.references.contains("org/app/Main"));
    }

    #[test]
    fn array_classes_and_member_descriptors_are_references() {
        let mut class = ClassFile::new(52, "org/app/Main", Some("java/lang/Object"));
        class.pool.class_index("[[Lorg/lib/Cell;").unwrap();
        let name = class.pool.utf8_index("run").unwrap();
        let desc = class
            .pool
            .utf8_index("(Lorg/lib/In;I)Lorg/lib/Out;")
            .unwrap();
        class
            .pool
            .push(Constant::NameAndType {
                name,
                descriptor: desc,
            })
            .unwrap();

        let summary = scan_class(&class.to_bytes().unwrap()).unwrap();
        for expected in ["org/lib/Cell", "org/lib/In", "org/lib/Out"] {
            assert!(summary.references.contains(expected), "{expected}");
        }
        assert!(!summary.references.contains("run"));
    }

    #[test]
    fn garbage_is_a_scan_error() {
        assert!(scan_class(b"not a class at all").is_err());
    }

    #[test]
    fn entry_names_map_to_class_names() {
        assert_eq!(
            class_name_of_entry("org/foo/Bar.class").as_deref(),
            Some("org.foo.Bar")
        );
        assert_eq!(
            class_name_of_entry("META-INF/versions/11/org/foo/Bar.class").as_deref(),
            Some("org.foo.Bar")
        );
        assert_eq!(class_name_of_entry("org/foo/bar.txt"), None);
        assert_eq!(
            strip_version_prefix("META-INF/versions/x/a/B"),
            "META-INF/versions/x/a/B"
        );
    }
}
