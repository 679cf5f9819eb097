use std::io::Read;

use zip::DateTime;

use crate::{
    jar::io::EntrySink,
    relocation::Relocator,
    transform::{ResourceTransformer, TransformError},
};

/// Swallows resources whose name ends with one of the configured suffixes
#[derive(Debug)]
pub struct DontIncludeResourceTransformer {
    suffixes: Vec<String>,
}

impl DontIncludeResourceTransformer {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self { suffixes }
    }
}

impl ResourceTransformer for DontIncludeResourceTransformer {
    fn can_transform_resource(&self, resource: &str) -> bool {
        self.suffixes
            .iter()
            .any(|suffix| !suffix.is_empty() && resource.ends_with(suffix.as_str()))
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
        false
    }

    fn modify_output(&mut self, _output: &mut dyn EntrySink) -> Result<(), TransformError> {
        Ok(())
    }
}
