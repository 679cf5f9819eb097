//! Duplicate tracking and the overlap report printed after a merge

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::{jar::analysis::scanner::class_name_of_entry, transform::manifest::MANIFEST_PATH};

/// How many names of one overlap group are listed before summarizing
const SHOWN_PER_GROUP: usize = 10;

/// Entries shared by exactly the same set of archives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapGroup {
    /// Sorted, at least two
    pub archives: Vec<PathBuf>,
    /// Dotted class names, sorted
    pub classes: Vec<String>,
    /// Resource entry names, sorted
    pub resources: Vec<String>,
}

/// Entry name to the archives that contained it
#[derive(Debug, Default)]
pub struct DuplicateTracker {
    entries: BTreeMap<String, BTreeSet<PathBuf>>,
}

impl DuplicateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: &str, archive: &Path) {
        self.entries
            .entry(entry.to_owned())
            .or_default()
            .insert(archive.to_owned());
    }

    /// Drops one recorded occurrence, used for resources a transformer merged
    pub fn forget(&mut self, entry: &str, archive: &Path) {
        if let Some(archives) = self.entries.get_mut(entry) {
            archives.remove(archive);
            if archives.is_empty() {
                self.entries.remove(entry);
            }
        }
    }

    /// Groups entries by their set of contributing archives and keeps the
    /// groups with more than one archive
    pub fn overlaps(&self) -> Vec<OverlapGroup> {
        let mut groups: BTreeMap<&BTreeSet<PathBuf>, (Vec<String>, Vec<String>)> = BTreeMap::new();
        for (entry, archives) in &self.entries {
            if archives.len() < 2 || entry == MANIFEST_PATH {
                continue;
            }
            let (classes, resources) = groups.entry(archives).or_default();
            match class_name_of_entry(entry) {
                Some(class) => classes.push(class),
                None => resources.push(entry.clone()),
            }
        }

        groups
            .into_iter()
            .map(|(archives, (mut classes, resources))| {
                classes.sort();
                OverlapGroup {
                    archives: archives.iter().cloned().collect(),
                    classes,
                    resources,
                }
            })
            .collect()
    }
}

fn display_name(archive: &Path) -> String {
    archive
        .file_name()
        .map_or_else(|| archive.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn log_names(names: &[String]) {
    for name in names.iter().take(SHOWN_PER_GROUP) {
        warn!("  - {name}");
    }
    if names.len() > SHOWN_PER_GROUP {
        warn!("  - {} more...", names.len() - SHOWN_PER_GROUP);
    }
}

/// Logs the overlap groups as warnings. Does nothing without overlaps.
pub fn log_overlaps(groups: &[OverlapGroup]) {
    if groups.is_empty() {
        return;
    }

    for group in groups {
        let archives = group
            .archives
            .iter()
            .map(|a| display_name(a))
            .collect::<Vec<_>>()
            .join(", ");
        if !group.classes.is_empty() {
            warn!(
                "{archives} define {} overlapping classes:",
                group.classes.len()
            );
            log_names(&group.classes);
        }
        if !group.resources.is_empty() {
            warn!(
                "{archives} define {} overlapping resources:",
                group.resources.len()
            );
            log_names(&group.resources);
        }
    }

    warn!(
        "Some entries are present in two or more archives. Only the first copy of each entry is \
         kept, which may break the merged archive if the copies differ."
    );
}
