use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::{result::ZipError, ZipArchive};

use crate::jar::analysis::scanner::{class_name_of_entry, scan_class, ScanError};

pub type ClassId = usize;

const MAX_PREALLOCATION: usize = 1 << 20;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] ZipError),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Class {entry}: {source}")]
    Class {
        entry: String,
        #[source]
        source: ScanError,
    },
}

/// Classes contributed by one archive or directory
#[derive(Debug, Clone)]
pub struct ClazzpathUnit {
    pub location: PathBuf,
    pub classes: Vec<ClassId>,
}

/// Whole-classpath class reference graph.
///
/// Nodes are dotted class names. A node exists for every referenced name,
/// but only names some unit actually contains are *defined*.
#[derive(Debug, Default)]
pub struct Clazzpath {
    names: Vec<String>,
    ids: HashMap<String, ClassId>,
    edges: Vec<Vec<ClassId>>,
    defined: Vec<bool>,
    units: Vec<ClazzpathUnit>,
}

impl Clazzpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every class of a zip archive as one unit. Nothing is added when
    /// any entry fails to read or parse.
    pub fn add_archive(&mut self, path: impl AsRef<Path>) -> Result<usize, AnalysisError> {
        let path = path.as_ref();
        let mut zip = ZipArchive::new(File::open(path)?)?;
        let mut classes = Vec::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let entry = file.name().to_owned();
            if !entry.ends_with(".class") {
                continue;
            }
            // The header size is untrusted
            let mut data = Vec::with_capacity((file.size() as usize).min(MAX_PREALLOCATION));
            file.read_to_end(&mut data)?;
            classes.push((entry, data));
        }
        self.add_classes(path, classes)
    }

    /// Adds every `.class` file below a directory as one unit.
    pub fn add_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize, AnalysisError> {
        let dir = dir.as_ref();
        let mut classes = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(dir) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !name.ends_with(".class") {
                continue;
            }
            classes.push((name, std::fs::read(entry.path())?));
        }
        self.add_classes(dir, classes)
    }

    /// Adds a unit from `(entry name, class bytes)` pairs.
    pub fn add_classes(
        &mut self,
        location: impl AsRef<Path>,
        classes: impl IntoIterator<Item = (String, Vec<u8>)>,
    ) -> Result<usize, AnalysisError> {
        let mut scanned = Vec::new();
        for (entry, data) in classes {
            let Some(name) = class_name_of_entry(&entry) else {
                continue;
            };
            let summary =
                scan_class(&data).map_err(|source| AnalysisError::Class { entry, source })?;
            scanned.push((name, summary.references));
        }

        let mut unit_classes = Vec::with_capacity(scanned.len());
        for (name, references) in scanned {
            let id = self.intern(&name);
            self.defined[id] = true;
            for reference in references {
                let target = self.intern(&reference.replace('/', "."));
                if target != id && !self.edges[id].contains(&target) {
                    self.edges[id].push(target);
                }
            }
            if !unit_classes.contains(&id) {
                unit_classes.push(id);
            }
        }

        let location = location.as_ref().to_path_buf();
        debug!(
            "Analyzed {} classes in {}",
            unit_classes.len(),
            location.display()
        );
        self.units.push(ClazzpathUnit {
            location,
            classes: unit_classes,
        });
        Ok(self.units.len() - 1)
    }

    fn intern(&mut self, name: &str) -> ClassId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.names.len();
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        self.edges.push(Vec::new());
        self.defined.push(false);
        id
    }

    pub fn unit(&self, unit: usize) -> &ClazzpathUnit {
        &self.units[unit]
    }

    pub fn units(&self) -> &[ClazzpathUnit] {
        &self.units
    }

    /// Number of nodes, defined or not
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<ClassId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: ClassId) -> &str {
        &self.names[id]
    }

    pub fn is_defined(&self, id: ClassId) -> bool {
        self.defined[id]
    }

    pub fn defined_classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        (0..self.names.len()).filter(|id| self.defined[*id])
    }

    pub fn dependencies(&self, id: ClassId) -> &[ClassId] {
        &self.edges[id]
    }

    /// Marks every class reachable from `seeds`, seeds included.
    pub fn reachable(&self, seeds: impl IntoIterator<Item = ClassId>) -> Vec<bool> {
        let mut seen = vec![false; self.names.len()];
        let mut queue: VecDeque<ClassId> = VecDeque::new();
        for seed in seeds {
            if !seen[seed] {
                seen[seed] = true;
                queue.push_back(seed);
            }
        }
        while let Some(id) = queue.pop_front() {
            for &dep in &self.edges[id] {
                if !seen[dep] {
                    seen[dep] = true;
                    queue.push_back(dep);
                }
            }
        }
        seen
    }

    /// Defined classes reachable from `seeds`, seeds excluded, sorted by name
    pub fn transitive_dependencies(&self, seeds: &[ClassId]) -> BTreeSet<&str> {
        let reached = self.reachable(seeds.iter().copied());
        reached
            .iter()
            .enumerate()
            .filter(|(id, hit)| **hit && self.defined[*id] && !seeds.contains(id))
            .map(|(id, _)| self.names[id].as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jar::core::{classfile::ACC_PUBLIC, ClassFile};

    fn class(name: &str, field_types: &[&str]) -> (String, Vec<u8>) {
        let mut class = ClassFile::new(52, name, Some("java/lang/Object"));
        for (i, ty) in field_types.iter().enumerate() {
            class
                .add_field(ACC_PUBLIC, &format!("f{i}"), &format!("L{ty};"))
                .unwrap();
        }
        (format!("{name}.class"), class.to_bytes().unwrap())
    }

    #[test]
    fn graph_links_units_by_name() {
        let mut cp = Clazzpath::new();
        let app = cp
            .add_classes("app", vec![class("app/Main", &["lib/A"])])
            .unwrap();
        cp.add_classes(
            "lib",
            vec![class("lib/A", &["lib/B"]), class("lib/B", &[]), class("lib/C", &[])],
        )
        .unwrap();

        let main = cp.unit(app).classes[0];
        let deps = cp.transitive_dependencies(&[main]);
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec!["lib.A", "lib.B"]);
        assert!(!cp.is_defined(cp.id("java.lang.Object").unwrap()));
        assert_eq!(cp.defined_classes().count(), 4);
    }

    #[test]
    fn bad_class_leaves_graph_untouched() {
        let mut cp = Clazzpath::new();
        let err = cp
            .add_classes(
                "broken",
                vec![
                    class("lib/A", &[]),
                    ("lib/B.class".to_string(), b"garbage".to_vec()),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Class { ref entry, .. } if entry == "lib/B.class"));
        assert!(cp.is_empty());
        assert!(cp.units().is_empty());
    }

    #[test]
    fn inflated_header_size_is_not_trusted() {
        use std::io::Write;
        use zip::{write::FileOptions, CompressionMethod, ZipWriter};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lying.jar");
        let (name, bytes) = class("lib/A", &[]);
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file(name, options).unwrap();
        zip.write_all(&bytes).unwrap();
        zip.finish().unwrap();

        // Claim a ~2 GiB uncompressed size in the central directory
        let mut raw = std::fs::read(&path).unwrap();
        let central = raw
            .windows(4)
            .position(|w| w == [0x50, 0x4b, 0x01, 0x02])
            .unwrap();
        raw[central + 24..central + 28].copy_from_slice(&0x7fff_fff0u32.to_le_bytes());
        std::fs::write(&path, raw).unwrap();

        let mut cp = Clazzpath::new();
        let unit = cp.add_archive(&path).unwrap();
        assert_eq!(cp.name(cp.unit(unit).classes[0]), "lib.A");
    }

    #[test]
    fn directory_units_are_walked() {
        let dir = tempfile::tempdir().unwrap();
        let (name, bytes) = class("org/x/Y", &[]);
        let path = dir.path().join(&name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"hi").unwrap();

        let mut cp = Clazzpath::new();
        let unit = cp.add_directory(dir.path()).unwrap();
        assert_eq!(cp.unit(unit).classes.len(), 1);
        assert_eq!(cp.name(cp.unit(unit).classes[0]), "org.x.Y");
    }
}
