//! Archive merge engine
//!
//! [`shade`] streams every input archive in order into one output archive.
//! Classes are rewritten through the relocators, resources are either claimed
//! by a transformer or copied, and the first archive to provide an entry name
//! wins. Output entry order follows input order, so identical inputs produce
//! identical archives.

use std::{
    fs::{self, File},
    io::{self, Read, Seek, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use thiserror::Error;
use tracing::{debug, info, warn};
use zip::{read::ZipFile, result::ZipError, ZipArchive};

use crate::{
    filter::Filter,
    jar::{core::remap_class_bytes, ClassFileError, JarWriter},
    overlap::{log_overlaps, DuplicateTracker, OverlapGroup},
    relocation::{Relocator, Remapper},
    transform::{ResourceTransformer, TransformError},
    types::{ShadeEvent, Stage, StageProgress},
};

/// Archive indexes are meaningless once entries move between archives
const INDEX_LIST_PATH: &str = "META-INF/INDEX.LIST";
const MODULE_INFO_PATH: &str = "module-info.class";

#[derive(Debug, Error)]
pub enum ShadeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Cannot create output archive {path}: {source}")]
    Output { path: PathBuf, source: io::Error },
    #[error("Cannot read archive {path}: {source}")]
    Archive { path: PathBuf, source: ZipError },
    #[error("Class file error: {0}")]
    ClassFile(#[from] ClassFileError),
    #[error("Transformer error: {0}")]
    Transform(#[from] TransformError),
    #[error("Error processing {entry} in {archive}: {source}")]
    Entry {
        archive: PathBuf,
        entry: String,
        source: Box<ShadeError>,
    },
}

impl ShadeError {
    fn in_entry(self, archive: &Path, entry: &str) -> Self {
        ShadeError::Entry {
            archive: archive.to_owned(),
            entry: entry.to_owned(),
            source: Box::new(self),
        }
    }
}

/// One merge. Filters and relocators may be shared between requests,
/// transformers may not.
pub struct ShadeRequest {
    /// Merged in this order
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub filters: Vec<Rc<dyn Filter>>,
    pub relocators: Vec<Relocator>,
    pub transformers: Vec<Box<dyn ResourceTransformer>>,
    /// Relocate package names inside `.java` entries
    pub shade_sources_content: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadeSummary {
    /// Every archive that was merged, in merge order
    pub archives: Vec<PathBuf>,
    /// File entries in the output, directories not counted
    pub entries_written: usize,
    pub overlaps: Vec<OverlapGroup>,
}

/// Merges `request.inputs` into `request.output`.
///
/// The output file is removed again when the merge fails.
pub fn shade(
    request: ShadeRequest,
    mut report_progress: impl FnMut(ShadeEvent),
) -> Result<ShadeSummary, ShadeError> {
    let ShadeRequest {
        inputs,
        output,
        filters,
        relocators,
        transformers,
        shade_sources_content,
    } = request;

    let mut writer = JarWriter::create(&output).map_err(|source| ShadeError::Output {
        path: output.clone(),
        source,
    })?;

    let mut merge = Merge {
        writer: &mut writer,
        remapper: Remapper::new(&relocators),
        relocators: &relocators,
        transformers,
        duplicates: DuplicateTracker::new(),
        shade_sources_content,
    };
    let merged = merge.run(&inputs, &filters, &mut report_progress);
    drop(merge);

    let outcome = match merged {
        Ok(overlaps) => {
            let entries_written = writer.entry_count();
            match writer.finish() {
                Ok(_) => Ok(ShadeSummary {
                    archives: inputs,
                    entries_written,
                    overlaps,
                }),
                Err(e) => Err(ShadeError::Io(e)),
            }
        }
        Err(e) => {
            drop(writer);
            Err(e)
        }
    };

    match outcome {
        Ok(summary) => {
            info!(
                "Wrote {} entries from {} archives to {}",
                summary.entries_written,
                summary.archives.len(),
                output.display()
            );
            for filter in &filters {
                filter.finished();
            }
            Ok(summary)
        }
        Err(e) => {
            if let Err(remove_error) = fs::remove_file(&output) {
                warn!(
                    "Cannot remove incomplete output {}: {remove_error}",
                    output.display()
                );
            }
            Err(e)
        }
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, ShadeError> {
    File::open(path)
        .map_err(ZipError::from)
        .and_then(ZipArchive::new)
        .map_err(|source| ShadeError::Archive {
            path: path.to_owned(),
            source,
        })
}

struct Merge<'a, W: Write + Seek> {
    writer: &'a mut JarWriter<W>,
    remapper: Remapper<'a>,
    relocators: &'a [Relocator],
    transformers: Vec<Box<dyn ResourceTransformer>>,
    duplicates: DuplicateTracker,
    shade_sources_content: bool,
}

impl<W: Write + Seek> Merge<'_, W> {
    fn run(
        &mut self,
        inputs: &[PathBuf],
        filters: &[Rc<dyn Filter>],
        report_progress: &mut impl FnMut(ShadeEvent),
    ) -> Result<Vec<OverlapGroup>, ShadeError> {
        let (mut manifest_transformers, transformers): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.transformers)
                .into_iter()
                .partition(|t| t.handles_manifest());
        self.transformers = transformers;

        report_progress(Stage::ReadingManifests.into());
        for transformer in &mut manifest_transformers {
            self.read_manifest(inputs, transformer.as_mut())?;
        }
        report_progress(ShadeEvent {
            stage: Stage::ReadingManifests,
            progress: StageProgress::Done,
        });

        for (idx, input) in inputs.iter().enumerate() {
            report_progress(ShadeEvent {
                stage: Stage::MergingArchives,
                progress: StageProgress::Percentage(idx as f32 / inputs.len() as f32),
            });
            let applicable: Vec<&Rc<dyn Filter>> =
                filters.iter().filter(|f| f.can_filter(input)).collect();
            self.merge_archive(input, &applicable)?;
        }
        report_progress(ShadeEvent {
            stage: Stage::MergingArchives,
            progress: StageProgress::Done,
        });

        report_progress(Stage::WritingTransformedResources.into());
        for transformer in &mut self.transformers {
            if transformer.has_transformed_resource() {
                transformer.modify_output(&mut *self.writer)?;
            }
        }
        report_progress(ShadeEvent {
            stage: Stage::WritingTransformedResources,
            progress: StageProgress::Done,
        });

        report_progress(Stage::ReportingOverlaps.into());
        let overlaps = self.duplicates.overlaps();
        log_overlaps(&overlaps);
        report_progress(ShadeEvent {
            stage: Stage::ReportingOverlaps,
            progress: StageProgress::Done,
        });

        Ok(overlaps)
    }

    /// Feeds the first manifest found in any input to `transformer` and
    /// writes its result right away, ahead of every other entry.
    fn read_manifest(
        &mut self,
        inputs: &[PathBuf],
        transformer: &mut dyn ResourceTransformer,
    ) -> Result<(), ShadeError> {
        'archives: for input in inputs {
            let mut zip = open_archive(input)?;
            for i in 0..zip.len() {
                let mut file = zip.by_index(i).map_err(|source| ShadeError::Archive {
                    path: input.clone(),
                    source,
                })?;
                if file.is_dir() {
                    continue;
                }
                let name = file.name().to_owned();
                if transformer.can_transform_resource(&name) {
                    let time = file.last_modified();
                    transformer
                        .process_resource(&name, &mut file, self.relocators, time)
                        .map_err(|e| ShadeError::from(e).in_entry(input, &name))?;
                    break 'archives;
                }
            }
        }

        if transformer.has_transformed_resource() {
            transformer.modify_output(&mut *self.writer)?;
        }
        Ok(())
    }

    fn merge_archive(
        &mut self,
        archive: &Path,
        filters: &[&Rc<dyn Filter>],
    ) -> Result<(), ShadeError> {
        debug!("Processing JAR {}", archive.display());
        let mut zip = open_archive(archive)?;
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(|source| ShadeError::Archive {
                path: archive.to_owned(),
                source,
            })?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_owned();
            if filters.iter().any(|f| f.is_filtered(&name)) {
                continue;
            }
            self.merge_entry(archive, &name, &mut file)
                .map_err(|e| e.in_entry(archive, &name))?;
        }
        Ok(())
    }

    fn merge_entry(
        &mut self,
        archive: &Path,
        name: &str,
        file: &mut ZipFile<'_>,
    ) -> Result<(), ShadeError> {
        if name == INDEX_LIST_PATH {
            return Ok(());
        }
        if name == MODULE_INFO_PATH {
            warn!(
                "Skipping {MODULE_INFO_PATH} from {}: merged archives cannot keep module boundaries",
                archive.display()
            );
            return Ok(());
        }

        let time = file.last_modified();
        let is_class = name.ends_with(".class");
        let mapped = if is_class {
            self.remapper.map_class_entry(name)
        } else {
            self.remapper.map_path(name)
        };
        self.writer.ensure_parent_directories(&mapped, time)?;
        self.duplicates.record(name, archive);

        if is_class {
            self.merge_class(archive, name, &mapped, file)
        } else if self.shade_sources_content && name.ends_with(".java") {
            if self.writer.contains(&mapped) {
                return Ok(());
            }
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            let mut content = String::from_utf8_lossy(&data).into_owned();
            for relocator in self.relocators {
                content = relocator.apply_to_source_content(&content);
            }
            self.writer.write(&mapped, time, content.as_bytes())?;
            Ok(())
        } else {
            self.merge_resource(archive, name, &mapped, file)
        }
    }

    fn merge_class(
        &mut self,
        archive: &Path,
        name: &str,
        mapped: &str,
        file: &mut ZipFile<'_>,
    ) -> Result<(), ShadeError> {
        if self.writer.contains(mapped) {
            debug!("Duplicate {mapped} in {}", archive.display());
            return Ok(());
        }

        let time = file.last_modified();
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if !self.remapper.has_relocators() {
            self.writer.write(mapped, time, &data)?;
            return Ok(());
        }

        match remap_class_bytes(&data, &self.remapper)? {
            Some(rewritten) => {
                debug!("Rewrote {name} as {mapped}");
                self.writer.write(mapped, time, &rewritten)?;
            }
            None => {
                debug!("Kept bytecode of {name}");
                self.writer.write(mapped, time, &data)?;
            }
        }
        Ok(())
    }

    fn merge_resource(
        &mut self,
        archive: &Path,
        name: &str,
        mapped: &str,
        file: &mut ZipFile<'_>,
    ) -> Result<(), ShadeError> {
        let time = file.last_modified();
        if let Some(transformer) = self
            .transformers
            .iter_mut()
            .find(|t| t.can_transform_resource(mapped))
        {
            transformer.process_resource(mapped, file, self.relocators, time)?;
            self.duplicates.forget(name, archive);
            return Ok(());
        }

        if self.writer.contains(mapped) {
            debug!("Duplicate {mapped} in {}", archive.display());
            return Ok(());
        }
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        self.writer.write(mapped, time, &data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use zip::{write::FileOptions, ZipWriter};

    use super::*;
    use crate::transform::ServicesResourceTransformer;

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(Cursor::new(fs::read(path).unwrap())).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_owned())
            .collect()
    }

    fn request(inputs: Vec<PathBuf>, output: PathBuf) -> ShadeRequest {
        ShadeRequest {
            inputs,
            output,
            filters: Vec::new(),
            relocators: Vec::new(),
            transformers: Vec::new(),
            shade_sources_content: false,
        }
    }

    #[test]
    fn index_and_module_info_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.jar");
        write_jar(
            &input,
            &[
                ("META-INF/INDEX.LIST", b"index"),
                ("module-info.class", b"\xCA\xFE\xBA\xBE"),
                ("a/data.txt", b"data"),
            ],
        );
        let output = dir.path().join("out.jar");

        let summary = shade(request(vec![input], output.clone()), |_| {}).unwrap();
        assert_eq!(summary.entries_written, 1);
        assert_eq!(entry_names(&output), ["a/", "a/data.txt"]);
    }

    #[test]
    fn transformed_resources_do_not_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jar");
        let b = dir.path().join("b.jar");
        write_jar(&a, &[("META-INF/services/x.Spi", b"a.Impl")]);
        write_jar(&b, &[("META-INF/services/x.Spi", b"b.Impl")]);
        let output = dir.path().join("out.jar");

        let mut request = request(vec![a, b], output.clone());
        request.transformers = vec![Box::new(ServicesResourceTransformer::new())];
        let summary = shade(request, |_| {}).unwrap();
        assert!(summary.overlaps.is_empty());

        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut content = String::new();
        zip.by_name("META-INF/services/x.Spi")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "a.Impl\nb.Impl\n");
    }

    #[test]
    fn failed_merge_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.jar");
        write_jar(&good, &[("a/A.class", b"not a class")]);
        let output = dir.path().join("out.jar");

        let mut request = request(vec![good.clone()], output.clone());
        request.relocators = vec![Relocator::package("a", "shaded.a").unwrap()];
        let error = shade(request, |_| {}).unwrap_err();
        match error {
            ShadeError::Entry { archive, entry, .. } => {
                assert_eq!(archive, good);
                assert_eq!(entry, "a/A.class");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.jar");
        let error = shade(
            request(vec![dir.path().join("missing.jar")], output.clone()),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(error, ShadeError::Archive { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn progress_reaches_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.jar");
        write_jar(&input, &[("x.txt", b"x")]);
        let mut done = Vec::new();
        shade(request(vec![input], dir.path().join("out.jar")), |event| {
            if event.progress == StageProgress::Done {
                done.push(event.stage);
            }
        })
        .unwrap();
        assert_eq!(
            done,
            [
                Stage::ReadingManifests,
                Stage::MergingArchives,
                Stage::WritingTransformedResources,
                Stage::ReportingOverlaps
            ]
        );
    }
}
