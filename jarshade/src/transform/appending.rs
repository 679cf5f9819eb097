use std::io::Read;

use zip::DateTime;

use crate::{
    jar::io::EntrySink,
    relocation::Relocator,
    transform::{put_merged, LatestTime, ResourceTransformer, TransformError},
};

/// Concatenates every occurrence of one resource, each followed by a newline
#[derive(Debug)]
pub struct AppendingTransformer {
    resource: String,
    data: Vec<u8>,
    time: LatestTime,
}

impl AppendingTransformer {
    pub fn new(resource: String) -> Self {
        Self {
            resource,
            data: Vec::new(),
            time: LatestTime::default(),
        }
    }
}

impl ResourceTransformer for AppendingTransformer {
    fn can_transform_resource(&self, resource: &str) -> bool {
        resource.eq_ignore_ascii_case(&self.resource)
    }

    fn process_resource(
        &mut self,
        _resource: &str,
        input: &mut dyn Read,
        _relocators: &[Relocator],
        time: DateTime,
    ) -> Result<(), TransformError> {
        input.read_to_end(&mut self.data)?;
        self.data.push(b'\n');
        self.time.observe(time);
        Ok(())
    }

    fn has_transformed_resource(&self) -> bool {
        !self.data.is_empty()
    }

    fn modify_output(&mut self, output: &mut dyn EntrySink) -> Result<(), TransformError> {
        let data = std::mem::take(&mut self.data);
        put_merged(output, &self.resource, self.time.get(), &data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn occurrences_are_concatenated() {
        let mut transformer = AppendingTransformer::new("reference.conf".to_owned());
        assert!(transformer.can_transform_resource("Reference.CONF"));
        assert!(!transformer.can_transform_resource("application.conf"));
        assert!(!transformer.has_transformed_resource());

        for part in ["a = 1", "b = 2"] {
            transformer
                .process_resource("reference.conf", &mut part.as_bytes(), &[], DateTime::default())
                .unwrap();
        }
        assert!(transformer.has_transformed_resource());

        let mut sink: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        transformer.modify_output(&mut sink).unwrap();
        assert_eq!(sink["reference.conf"], b"a = 1\nb = 2\n");
    }
}
