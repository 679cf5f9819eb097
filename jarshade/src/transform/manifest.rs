use std::{collections::BTreeMap, io::Read};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};
use zip::DateTime;

use crate::{
    jar::io::EntrySink,
    relocation::Relocator,
    transform::{put_merged, LatestTime, ResourceTransformer, TransformError},
};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

const MANIFEST_VERSION: &str = "Manifest-Version";
const MAIN_CLASS: &str = "Main-Class";
const MAX_LINE_BYTES: usize = 72;
const MAX_RELOCATION_PASSES: usize = 32;

/// Package-list attributes relocated by default
const DEFAULT_ATTRIBUTES: &[&str] = &[
    "Export-Package",
    "Import-Package",
    "Provide-Capability",
    "Require-Capability",
];

lazy_static! {
    /// Anything that may be a package or class name inside an attribute
    static ref NAME_TOKEN: Regex = Regex::new(r"[A-Za-z0-9_$.]+").unwrap();
}

/// JAR manifest: a main section followed by named sections. Attribute
/// names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    main: Vec<(String, String)>,
    sections: Vec<Vec<(String, String)>>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, TransformError> {
        let mut manifest = Manifest::default();
        let mut current: Vec<(String, String)> = Vec::new();
        let mut in_main = true;

        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        for (number, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                if in_main {
                    manifest.main = std::mem::take(&mut current);
                    in_main = false;
                } else if !current.is_empty() {
                    manifest.sections.push(std::mem::take(&mut current));
                }
                continue;
            }
            if let Some(continued) = line.strip_prefix(' ') {
                match current.last_mut() {
                    Some((_, value)) => value.push_str(continued),
                    None => {
                        return Err(TransformError::Manifest(format!(
                            "continuation without attribute on line {}",
                            number + 1
                        )))
                    }
                }
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(TransformError::Manifest(format!(
                    "missing `:` on line {}",
                    number + 1
                )));
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            current.push((name.to_owned(), value.to_owned()));
        }

        if in_main {
            manifest.main = current;
        } else if !current.is_empty() {
            manifest.sections.push(current);
        }
        Ok(manifest)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.main
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replaces the attribute in place, or appends it.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .main
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.main.push((name.to_owned(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.main.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Serializes with CRLF line ends and 72-byte line wrapping, version
    /// attribute first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let version = self.get(MANIFEST_VERSION).unwrap_or("1.0");
        write_attribute(&mut out, MANIFEST_VERSION, version);
        for (name, value) in &self.main {
            if !name.eq_ignore_ascii_case(MANIFEST_VERSION) {
                write_attribute(&mut out, name, value);
            }
        }
        out.extend_from_slice(b"\r\n");

        for section in &self.sections {
            for (name, value) in section {
                write_attribute(&mut out, name, value);
            }
            out.extend_from_slice(b"\r\n");
        }
        out
    }
}

fn write_attribute(out: &mut Vec<u8>, name: &str, value: &str) {
    let line = format!("{name}: {value}");
    let mut rest = line.as_str();
    let mut limit = MAX_LINE_BYTES;
    loop {
        if rest.len() <= limit {
            out.extend_from_slice(rest.as_bytes());
            out.extend_from_slice(b"\r\n");
            return;
        }
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.extend_from_slice(rest[..cut].as_bytes());
        out.extend_from_slice(b"\r\n ");
        rest = &rest[cut..];
        // The leading space of a continuation line counts too
        limit = MAX_LINE_BYTES - 1;
    }
}

/// Relocates every package-like token of an attribute value, repeating full
/// passes over `relocators` until one pass changes nothing.
pub fn relocate_attribute(value: &str, relocators: &[Relocator]) -> String {
    NAME_TOKEN
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            let mut current = token.to_owned();
            for _ in 0..MAX_RELOCATION_PASSES {
                let mut next = current.clone();
                for relocator in relocators {
                    if relocator.can_relocate_class(&next) {
                        next = relocator.relocate_class(&next);
                    }
                }
                if next == current {
                    return current;
                }
                current = next;
            }
            warn!("Relocation of `{token}` did not settle, keeping `{current}`");
            current
        })
        .into_owned()
}

/// Keeps the first manifest seen, relocating its package-list attributes.
/// Writes a manifest even when no input had one.
#[derive(Debug, Default)]
pub struct ManifestResourceTransformer {
    main_class: Option<String>,
    manifest_entries: BTreeMap<String, Option<String>>,
    additional_attributes: Vec<String>,
    manifest: Option<Manifest>,
    time: LatestTime,
}

impl ManifestResourceTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_main_class(mut self, main_class: Option<String>) -> Self {
        self.main_class = main_class;
        self
    }

    pub fn with_manifest_entries(mut self, entries: BTreeMap<String, Option<String>>) -> Self {
        self.manifest_entries = entries;
        self
    }

    pub fn with_additional_attributes(mut self, attributes: Vec<String>) -> Self {
        self.additional_attributes = attributes;
        self
    }
}

impl ResourceTransformer for ManifestResourceTransformer {
    fn can_transform_resource(&self, resource: &str) -> bool {
        resource.eq_ignore_ascii_case(MANIFEST_PATH)
    }

    fn process_resource(
        &mut self,
        resource: &str,
        input: &mut dyn Read,
        relocators: &[Relocator],
        time: DateTime,
    ) -> Result<(), TransformError> {
        if self.manifest.is_some() {
            debug!("Ignoring additional manifest {resource}");
            return Ok(());
        }

        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        let mut manifest = Manifest::parse(&String::from_utf8_lossy(&data))?;

        if !relocators.is_empty() {
            let attributes = DEFAULT_ATTRIBUTES
                .iter()
                .copied()
                .chain(self.additional_attributes.iter().map(String::as_str));
            for attribute in attributes {
                if let Some(value) = manifest.get(attribute) {
                    let relocated = relocate_attribute(value, relocators);
                    manifest.set(attribute, relocated);
                }
            }
        }

        self.manifest = Some(manifest);
        self.time.observe(time);
        Ok(())
    }

    fn has_transformed_resource(&self) -> bool {
        true
    }

    fn modify_output(&mut self, output: &mut dyn EntrySink) -> Result<(), TransformError> {
        let mut manifest = self.manifest.take().unwrap_or_default();
        if let Some(main_class) = &self.main_class {
            manifest.set(MAIN_CLASS, main_class.as_str());
        }
        for (name, value) in &self.manifest_entries {
            match value {
                Some(value) => manifest.set(name, value.as_str()),
                None => manifest.remove(name),
            }
        }
        put_merged(output, MANIFEST_PATH, self.time.get(), &manifest.to_bytes())?;
        Ok(())
    }

    fn handles_manifest(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relocators(rules: &[(&str, &str)]) -> Vec<Relocator> {
        rules
            .iter()
            .map(|(from, to)| Relocator::package(from, to).unwrap())
            .collect()
    }

    fn output(transformer: &mut ManifestResourceTransformer) -> String {
        let mut sink: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        transformer.modify_output(&mut sink).unwrap();
        String::from_utf8(sink.remove(MANIFEST_PATH).unwrap()).unwrap()
    }

    #[test]
    fn chained_relocations_reach_a_fixed_point() {
        let relocators = relocators(&[("javax", "jakarta"), ("jakarta.foo", "jakarta2.foo")]);
        assert_eq!(relocate_attribute("javax.foo", &relocators), "jakarta2.foo");
    }

    #[test]
    fn self_prefixing_rule_terminates() {
        let relocators = relocators(&[("org", "shaded.org")]);
        assert_eq!(
            relocate_attribute("org.foo;version=\"[1.0,2)\",org.bar", &relocators),
            "shaded.org.foo;version=\"[1.0,2)\",shaded.org.bar"
        );
    }

    #[test]
    fn first_manifest_wins_and_is_relocated() {
        let mut transformer = ManifestResourceTransformer::new();
        let relocators = relocators(&[("org.foo", "shaded.org.foo")]);
        let first = "Manifest-Version: 1.0\r\nExport-Package: org.foo.api,org.foo.impl\r\nBuilt-By: me\r\n\r\n";
        let second = "Manifest-Version: 1.0\r\nBuilt-By: someone else\r\n\r\n";
        transformer
            .process_resource(MANIFEST_PATH, &mut first.as_bytes(), &relocators, DateTime::default())
            .unwrap();
        transformer
            .process_resource(MANIFEST_PATH, &mut second.as_bytes(), &relocators, DateTime::default())
            .unwrap();

        let text = output(&mut transformer);
        assert!(text.starts_with("Manifest-Version: 1.0\r\n"));
        assert!(text.contains("Export-Package: shaded.org.foo.api,shaded.org.foo.impl\r\n"));
        assert!(text.contains("Built-By: me\r\n"));
    }

    #[test]
    fn configured_entries_are_applied() {
        let mut transformer = ManifestResourceTransformer::new()
            .with_main_class(Some("app.Main".into()))
            .with_manifest_entries(BTreeMap::from([
                ("Built-By".to_string(), None),
                ("X-Shaded".to_string(), Some("true".to_string())),
            ]));
        let input = "Manifest-Version: 1.0\nBuilt-By: me\n";
        transformer
            .process_resource(MANIFEST_PATH, &mut input.as_bytes(), &[], DateTime::default())
            .unwrap();

        let text = output(&mut transformer);
        assert_eq!(
            text,
            "Manifest-Version: 1.0\r\nMain-Class: app.Main\r\nX-Shaded: true\r\n\r\n"
        );
    }

    #[test]
    fn manifest_is_created_when_missing() {
        let mut transformer = ManifestResourceTransformer::new();
        assert!(transformer.has_transformed_resource());
        assert_eq!(output(&mut transformer), "Manifest-Version: 1.0\r\n\r\n");
    }

    #[test]
    fn long_values_wrap_and_unwrap() {
        let long = "x".repeat(150);
        let mut manifest = Manifest::default();
        manifest.set("Class-Path", long.as_str());
        let bytes = manifest.to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.split("\r\n").all(|line| line.len() <= MAX_LINE_BYTES));
        let parsed = Manifest::parse(&text).unwrap();
        assert_eq!(parsed.get("class-path"), Some(long.as_str()));
    }

    #[test]
    fn named_sections_survive() {
        let text = "Manifest-Version: 1.0\r\n\r\nName: org/foo/\r\nSealed: true\r\n\r\n";
        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(String::from_utf8(manifest.to_bytes()).unwrap(), text);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Manifest::parse("no colon here\n").is_err());
        assert!(Manifest::parse(" continuation first\n").is_err());
    }
}
