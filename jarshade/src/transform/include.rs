use std::{fs, io::Read, path::PathBuf};

use zip::DateTime;

use crate::{
    jar::io::EntrySink,
    relocation::Relocator,
    transform::{put_merged, ResourceTransformer, TransformError},
};

/// Adds the contents of a file on disk as `resource` in the output
#[derive(Debug)]
pub struct IncludeResourceTransformer {
    resource: String,
    file: PathBuf,
}

impl IncludeResourceTransformer {
    pub fn new(resource: String, file: PathBuf) -> Self {
        Self { resource, file }
    }
}

impl ResourceTransformer for IncludeResourceTransformer {
    fn can_transform_resource(&self, _resource: &str) -> bool {
        false
    }

    fn process_resource(
        &mut self,
        _resource: &str,
        _input: &mut dyn Read,
        _relocators: &[Relocator],
        _time: DateTime,
    ) -> Result<(), TransformError> {
        Ok(())
    }

    fn has_transformed_resource(&self) -> bool {
        self.file.is_file()
    }

    fn modify_output(&mut self, output: &mut dyn EntrySink) -> Result<(), TransformError> {
        let data = fs::read(&self.file)?;
        put_merged(output, &self.resource, DateTime::default(), &data)?;
        Ok(())
    }
}
