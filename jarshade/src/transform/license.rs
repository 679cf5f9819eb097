use std::io::Read;

use zip::DateTime;

use crate::{
    jar::io::EntrySink,
    relocation::Relocator,
    transform::{ResourceTransformer, TransformError},
};

const LICENSE_PATH: &str = "META-INF/LICENSE";
const LICENSE_TXT_PATH: &str = "META-INF/LICENSE.txt";
const LICENSE_MD_PATH: &str = "META-INF/LICENSE.md";

/// Drops bundled Apache license files from dependencies
#[derive(Debug, Default, Clone, Copy)]
pub struct ApacheLicenseResourceTransformer;

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

impl ResourceTransformer for ApacheLicenseResourceTransformer {
    fn can_transform_resource(&self, resource: &str) -> bool {
        resource == LICENSE_PATH
            || starts_with_ignore_case(resource, LICENSE_TXT_PATH)
            || starts_with_ignore_case(resource, LICENSE_MD_PATH)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn license_names() {
        let transformer = ApacheLicenseResourceTransformer;
        assert!(transformer.can_transform_resource("META-INF/LICENSE"));
        assert!(transformer.can_transform_resource("meta-inf/license.TXT"));
        assert!(transformer.can_transform_resource("META-INF/LICENSE.md"));
        assert!(!transformer.can_transform_resource("META-INF/license"));
        assert!(!transformer.can_transform_resource("META-INF/LICENSE-2.0"));
        assert!(!transformer.can_transform_resource("META-INF/LIC"));
    }
}
