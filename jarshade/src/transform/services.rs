use std::{collections::BTreeMap, io::Read};

use zip::DateTime;

use crate::{
    jar::io::EntrySink,
    relocation::Relocator,
    transform::{put_merged, LatestTime, ResourceTransformer, TransformError},
};

const SERVICES_PREFIX: &str = "META-INF/services/";

/// Merges `META-INF/services/*` provider lists across archives, relocating
/// the service type in the file name and the listed providers.
#[derive(Debug, Default)]
pub struct ServicesResourceTransformer {
    /// Output path to provider lines in first-seen order, without
    /// duplicates
    entries: BTreeMap<String, Vec<String>>,
    time: LatestTime,
}

impl ServicesResourceTransformer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceTransformer for ServicesResourceTransformer {
    fn can_transform_resource(&self, resource: &str) -> bool {
        resource
            .strip_prefix(SERVICES_PREFIX)
            .is_some_and(|service| !service.is_empty())
    }

    fn process_resource(
        &mut self,
        resource: &str,
        input: &mut dyn Read,
        relocators: &[Relocator],
        time: DateTime,
    ) -> Result<(), TransformError> {
        let service = resource.strip_prefix(SERVICES_PREFIX).unwrap_or(resource);
        let service = relocators
            .iter()
            .find(|r| r.can_relocate_class(service))
            .map_or_else(|| service.to_owned(), |r| r.relocate_class(service));

        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        let text = String::from_utf8_lossy(&data);

        let lines = self
            .entries
            .entry(format!("{SERVICES_PREFIX}{service}"))
            .or_default();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let mut line = line.to_owned();
            for relocator in relocators {
                if relocator.can_relocate_class(&line) {
                    line = relocator.apply_to_source_content(&line);
                }
            }
            if !lines.contains(&line) {
                lines.push(line);
            }
        }

        self.time.observe(time);
        Ok(())
    }

    fn has_transformed_resource(&self) -> bool {
        !self.entries.is_empty()
    }

    fn modify_output(&mut self, output: &mut dyn EntrySink) -> Result<(), TransformError> {
        let time = self.time.get();
        for (path, lines) in std::mem::take(&mut self.entries) {
            let mut data = String::new();
            for line in lines {
                data.push_str(&line);
                data.push('\n');
            }
            put_merged(output, &path, time, data.as_bytes())?;
        }
        Ok(())
    }
}
