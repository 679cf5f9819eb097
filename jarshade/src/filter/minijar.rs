//! Class-dependency minimization.
//!
//! Builds one reference graph over the artifact being shaded and all of its
//! dependencies, then marks as removable every class the artifact cannot
//! reach. Service implementations listed under `META-INF/services/` are
//! restored whenever their service type is still needed, repeated until a
//! full scan restores nothing.
//!
//! A dependency that cannot be analyzed is left out of the graph with a
//! warning, so its classes are never removed and whatever only it refers to
//! may be. The result is best effort in that case.

use std::{
    cell::Cell,
    collections::HashSet,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
    rc::Rc,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::{
    filter::{Filter, SimpleFilter},
    jar::analysis::{class_name_of_entry, AnalysisError, ClassId, Clazzpath},
};

const SERVICES_PREFIX: &str = "META-INF/services/";

/// The artifact being shaded and its resolved runtime dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClasspath {
    /// Archive or class directory of the artifact itself
    pub artifact: PathBuf,
    /// Dependency archives or class directories, in classpath order
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct MinijarFilter {
    classpath: Clazzpath,
    removable: Vec<bool>,
    kept: Cell<usize>,
    removed: Cell<usize>,
}

impl MinijarFilter {
    /// Analyzes the whole classpath. Fails only when the artifact itself
    /// cannot be analyzed.
    ///
    /// `entry_points` narrow the kept seed from every artifact class to the
    /// named classes, as long as at least one of them exists. Classes a
    /// `filters` entry specifically includes stay, along with what they
    /// reach.
    pub fn new(
        project: &ProjectClasspath,
        filters: &[Rc<SimpleFilter>],
        entry_points: &[String],
    ) -> Result<Self, AnalysisError> {
        let mut classpath = Clazzpath::new();
        let artifact_unit = add_unit(&mut classpath, &project.artifact)?;

        let mut dependency_units = Vec::with_capacity(project.dependencies.len());
        for dependency in &project.dependencies {
            match add_unit(&mut classpath, dependency) {
                Ok(unit) => dependency_units.push((dependency.as_path(), unit)),
                Err(err) => warn!(
                    "Skipping dependency {} in minimization analysis: {err}",
                    dependency.display()
                ),
            }
        }

        let mut filter = Self {
            removable: vec![false; classpath.len()],
            classpath,
            kept: Cell::new(0),
            removed: Cell::new(0),
        };
        for id in filter.classpath.defined_classes().collect::<Vec<_>>() {
            filter.removable[id] = true;
        }

        if let Some(module_info) = filter.classpath.id("module-info") {
            if filter.removable[module_info] {
                filter.removable[module_info] = false;
                warn!(
                    "Not minimizing module-info of {}, the merge drops it",
                    project
                        .artifact
                        .file_name()
                        .unwrap_or_default()
                        .to_string_lossy()
                );
            }
        }

        let artifact_classes = filter.classpath.unit(artifact_unit).classes.clone();
        filter.keep_ancestor_package_infos(&artifact_classes);

        let entry_ids: Vec<ClassId> = entry_points
            .iter()
            .filter_map(|name| filter.classpath.id(name))
            .filter(|id| filter.classpath.is_defined(*id))
            .collect();
        if entry_ids.is_empty() {
            filter.keep_with_dependencies(&artifact_classes);
        } else {
            debug!("Minimizing from {} entry points", entry_ids.len());
            filter.keep_with_dependencies(&entry_ids);
        }

        filter.keep_specifically_included(&dependency_units, filters);
        filter.keep_services(project);

        Ok(filter)
    }

    fn keep_with_dependencies(&mut self, seeds: &[ClassId]) {
        let reached = self.classpath.reachable(seeds.iter().copied());
        for (id, hit) in reached.into_iter().enumerate() {
            if hit {
                self.removable[id] = false;
            }
        }
    }

    /// Package markers of every package enclosing the artifact's classes or
    /// their dependencies
    fn keep_ancestor_package_infos(&mut self, artifact_classes: &[ClassId]) {
        let reached = self.classpath.reachable(artifact_classes.iter().copied());
        let mut packages: HashSet<String> = HashSet::new();
        for id in (0..reached.len()).filter(|id| reached[*id]) {
            let mut name = self.classpath.name(id);
            while let Some((package, _)) = name.rsplit_once('.') {
                name = package;
                packages.insert(package.to_owned());
            }
        }
        for package in packages {
            if let Some(id) = self.classpath.id(&format!("{package}.package-info")) {
                self.removable[id] = false;
            }
        }
    }

    fn keep_specifically_included(
        &mut self,
        dependency_units: &[(&Path, usize)],
        filters: &[Rc<SimpleFilter>],
    ) {
        for (dependency, unit) in dependency_units {
            for filter in filters.iter().filter(|f| f.can_filter(dependency)) {
                let included: Vec<ClassId> = self
                    .classpath
                    .unit(*unit)
                    .classes
                    .iter()
                    .copied()
                    .filter(|id| self.removable[*id])
                    .filter(|id| {
                        filter.is_specifically_included(&self.classpath.name(*id).replace('.', "/"))
                    })
                    .collect();
                for id in &included {
                    debug!(
                        "Removing {} from removable classes",
                        self.classpath.name(*id)
                    );
                }
                self.keep_with_dependencies(&included);
            }
        }
    }

    fn keep_services(&mut self, project: &ProjectClasspath) {
        let mut descriptors = Vec::new();
        for element in std::iter::once(&project.artifact).chain(&project.dependencies) {
            match read_service_descriptors(element) {
                Ok(found) => descriptors.extend(found),
                Err(err) => warn!(
                    "Ignoring classpath element {} while scanning services: {err}",
                    element.display()
                ),
            }
        }

        // Restoring a provider can make another service type needed
        while self.keep_service_providers(&descriptors) {}
    }

    /// One pass over all service descriptors. Returns whether any class was
    /// restored.
    fn keep_service_providers(&mut self, descriptors: &[(String, String)]) -> bool {
        let mut restored = false;
        for (service, content) in descriptors {
            let needed = match self.classpath.id(service) {
                Some(id) => !self.removable[id],
                None => true,
            };
            if !needed {
                continue;
            }

            for line in content.lines() {
                let class_name = line.split('#').next().unwrap_or_default().trim();
                if class_name.is_empty() {
                    continue;
                }
                let Some(id) = self.classpath.id(class_name) else {
                    continue;
                };
                if !self.removable[id] {
                    continue;
                }
                debug!("{class_name} was not removed because it is a service");
                self.keep_with_dependencies(&[id]);
                restored = true;
            }
        }
        restored
    }

    /// `(kept, removed)` class entries seen by [`Filter::is_filtered`]
    pub fn counts(&self) -> (usize, usize) {
        (self.kept.get(), self.removed.get())
    }

    pub fn is_removable(&self, class_name: &str) -> bool {
        self.classpath
            .id(class_name)
            .is_some_and(|id| self.removable[id])
    }
}

impl Filter for MinijarFilter {
    fn can_filter(&self, _archive: &Path) -> bool {
        true
    }

    fn is_filtered(&self, entry: &str) -> bool {
        let Some(class_name) = class_name_of_entry(entry) else {
            return false;
        };
        if self.is_removable(&class_name) {
            debug!("Removing {class_name}");
            self.removed.set(self.removed.get() + 1);
            true
        } else {
            self.kept.set(self.kept.get() + 1);
            false
        }
    }

    fn finished(&self) {
        let (kept, removed) = self.counts();
        info!("{}", statistics(kept, kept + removed));
    }
}

/// `Minimized kept -> total (percentage)`
fn statistics(kept: usize, total: usize) -> String {
    if total == 0 {
        return format!("Minimized {kept} -> {total}");
    }
    format!("Minimized {kept} -> {total} ({}%)", kept * 100 / total)
}

fn add_unit(classpath: &mut Clazzpath, path: &Path) -> Result<usize, AnalysisError> {
    if path.is_dir() {
        classpath.add_directory(path)
    } else {
        classpath.add_archive(path)
    }
}

/// `(service type, descriptor text)` for every `META-INF/services/*` file
fn read_service_descriptors(element: &Path) -> io::Result<Vec<(String, String)>> {
    let mut descriptors = Vec::new();

    if element.is_dir() {
        let services = element.join(SERVICES_PREFIX);
        if !services.is_dir() {
            return Ok(descriptors);
        }
        for entry in WalkDir::new(&services).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let service = entry.file_name().to_string_lossy().into_owned();
            let data = std::fs::read(entry.path())?;
            descriptors.push((service, String::from_utf8_lossy(&data).into_owned()));
        }
        return Ok(descriptors);
    }

    let mut zip = ZipArchive::new(File::open(element)?).map_err(io::Error::other)?;
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(io::Error::other)?;
        if file.is_dir() {
            continue;
        }
        let Some(service) = file.name().strip_prefix(SERVICES_PREFIX) else {
            continue;
        };
        if service.is_empty() || service.contains('/') {
            continue;
        }
        let service = service.to_owned();
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        descriptors.push((service, String::from_utf8_lossy(&data).into_owned()));
    }
    Ok(descriptors)
}
