use std::io::Read;

use xml::EmitterConfig;
use xmltree::Element;
use zip::DateTime;

use crate::{
    jar::io::EntrySink,
    relocation::Relocator,
    transform::{put_merged, LatestTime, ResourceTransformer, TransformError},
};

/// Merges every occurrence of one XML resource into the first document's
/// root element
#[derive(Debug)]
pub struct XmlAppendingTransformer {
    resource: String,
    document: Option<Element>,
    time: LatestTime,
}

impl XmlAppendingTransformer {
    pub fn new(resource: String) -> Self {
        Self {
            resource,
            document: None,
            time: LatestTime::default(),
        }
    }

    fn xml_error(&self, message: impl ToString) -> TransformError {
        TransformError::Xml {
            resource: self.resource.clone(),
            message: message.to_string(),
        }
    }
}

impl ResourceTransformer for XmlAppendingTransformer {
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
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        let incoming = Element::parse(data.as_slice()).map_err(|e| self.xml_error(e))?;

        match &mut self.document {
            None => self.document = Some(incoming),
            Some(root) => {
                for (name, value) in incoming.attributes {
                    root.attributes.entry(name).or_insert(value);
                }
                root.children.extend(incoming.children);
            }
        }

        self.time.observe(time);
        Ok(())
    }

    fn has_transformed_resource(&self) -> bool {
        self.document.is_some()
    }

    fn modify_output(&mut self, output: &mut dyn EntrySink) -> Result<(), TransformError> {
        let Some(root) = self.document.take() else {
            return Ok(());
        };
        let mut data = Vec::new();
        let config = EmitterConfig::new().perform_indent(true);
        root.write_with_config(&mut data, config)
            .map_err(|e| self.xml_error(e))?;
        put_merged(output, &self.resource, self.time.get(), &data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn children_and_missing_attributes_are_merged() {
        let mut transformer = XmlAppendingTransformer::new("META-INF/plexus/components.xml".to_owned());
        let resource = "META-INF/plexus/components.xml";
        assert!(transformer.can_transform_resource(resource));

        transformer
            .process_resource(
                resource,
                &mut r#"<components a="1"><component id="x"/></components>"#.as_bytes(),
                &[],
                DateTime::default(),
            )
            .unwrap();
        transformer
            .process_resource(
                resource,
                &mut r#"<components a="2" b="3"><component id="y"/></components>"#.as_bytes(),
                &[],
                DateTime::default(),
            )
            .unwrap();
        assert!(transformer.has_transformed_resource());

        let mut sink: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        transformer.modify_output(&mut sink).unwrap();
        let merged = Element::parse(sink[resource].as_slice()).unwrap();
        assert_eq!(merged.attributes.get("a").map(String::as_str), Some("1"));
        assert_eq!(merged.attributes.get("b").map(String::as_str), Some("3"));
        let ids: Vec<_> = merged
            .children
            .iter()
            .filter_map(|node| node.as_element())
            .filter_map(|e| e.attributes.get("id").cloned())
            .collect();
        assert_eq!(ids, ["x", "y"]);
    }

    #[test]
    fn malformed_xml_names_the_resource() {
        let mut transformer = XmlAppendingTransformer::new("a.xml".to_owned());
        let error = transformer
            .process_resource("a.xml", &mut "<open>".as_bytes(), &[], DateTime::default())
            .unwrap_err();
        assert!(matches!(error, TransformError::Xml { resource, .. } if resource == "a.xml"));
    }
}
