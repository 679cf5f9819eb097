//! Resource transformers
//!
//! A transformer claims resources by name while archives are read, keeps
//! whatever it needs from them, and writes its merged result once all
//! archives are consumed. Transformers hold per-merge state, so every merge
//! needs fresh instances (see [`TransformerSpec::build`]).

use std::{collections::BTreeMap, io, io::Read, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use zip::DateTime;

use crate::{jar::io::EntrySink, relocation::Relocator};

pub mod appending;
pub mod dont_include;
pub mod include;
pub mod license;
pub mod manifest;
pub mod services;
pub mod xml_appending;

pub use appending::AppendingTransformer;
pub use dont_include::DontIncludeResourceTransformer;
pub use include::IncludeResourceTransformer;
pub use license::ApacheLicenseResourceTransformer;
pub use manifest::ManifestResourceTransformer;
pub use services::ServicesResourceTransformer;
pub use xml_appending::XmlAppendingTransformer;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed manifest: {0}")]
    Manifest(String),
    #[error("XML error in {resource}: {message}")]
    Xml { resource: String, message: String },
}

pub trait ResourceTransformer {
    /// Whether this transformer takes ownership of `resource`
    fn can_transform_resource(&self, resource: &str) -> bool;

    /// Consumes one occurrence of a claimed resource. Must not assume it
    /// owns `input` beyond reading it.
    fn process_resource(
        &mut self,
        resource: &str,
        input: &mut dyn Read,
        relocators: &[Relocator],
        time: DateTime,
    ) -> Result<(), TransformError>;

    /// Whether [`ResourceTransformer::modify_output`] has anything to write
    fn has_transformed_resource(&self) -> bool;

    /// Writes the merged result. Called at most once per merge.
    fn modify_output(&mut self, output: &mut dyn EntrySink) -> Result<(), TransformError>;

    /// Manifest transformers get a dedicated first pass over all archives
    fn handles_manifest(&self) -> bool {
        false
    }
}

/// Writes a merged resource. An entry already in the output wins over it.
pub(crate) fn put_merged(
    output: &mut dyn EntrySink,
    name: &str,
    time: DateTime,
    data: &[u8],
) -> Result<(), TransformError> {
    if !output.put_entry(name, time, data)? {
        warn!("Output already has {name}, merged resource dropped");
    }
    Ok(())
}

/// Configured transformer, buildable into a fresh instance per merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "implementation", rename_all = "camelCase")]
pub enum TransformerSpec {
    #[serde(rename_all = "camelCase")]
    Manifest {
        #[serde(default)]
        main_class: Option<String>,
        /// `null` values remove the attribute
        #[serde(default)]
        manifest_entries: BTreeMap<String, Option<String>>,
        #[serde(default)]
        additional_attributes: Vec<String>,
    },
    Services,
    Appending {
        resource: String,
    },
    XmlAppending {
        resource: String,
    },
    DontInclude {
        resources: Vec<String>,
    },
    Include {
        resource: String,
        file: PathBuf,
    },
    ApacheLicense,
}

impl TransformerSpec {
    pub fn build(&self) -> Box<dyn ResourceTransformer> {
        match self {
            TransformerSpec::Manifest {
                main_class,
                manifest_entries,
                additional_attributes,
            } => Box::new(
                ManifestResourceTransformer::new()
                    .with_main_class(main_class.clone())
                    .with_manifest_entries(manifest_entries.clone())
                    .with_additional_attributes(additional_attributes.clone()),
            ),
            TransformerSpec::Services => Box::new(ServicesResourceTransformer::new()),
            TransformerSpec::Appending { resource } => {
                Box::new(AppendingTransformer::new(resource.clone()))
            }
            TransformerSpec::XmlAppending { resource } => {
                Box::new(XmlAppendingTransformer::new(resource.clone()))
            }
            TransformerSpec::DontInclude { resources } => {
                Box::new(DontIncludeResourceTransformer::new(resources.clone()))
            }
            TransformerSpec::Include { resource, file } => Box::new(
                IncludeResourceTransformer::new(resource.clone(), file.clone()),
            ),
            TransformerSpec::ApacheLicense => Box::new(ApacheLicenseResourceTransformer),
        }
    }
}

/// Keeps the latest timestamp of the resources a transformer consumed
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LatestTime(Option<DateTime>);

impl LatestTime {
    pub(crate) fn observe(&mut self, time: DateTime) {
        self.0 = Some(match self.0 {
            Some(current) => crate::jar::io::latest(current, time),
            None => time,
        });
    }

    pub(crate) fn get(&self) -> DateTime {
        self.0.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_deserialize_by_implementation_tag() {
        let specs: Vec<TransformerSpec> = serde_json::from_str(
            r#"[
                {"implementation": "services"},
                {"implementation": "manifest", "mainClass": "app.Main", "manifestEntries": {"X-Gone": null}},
                {"implementation": "appending", "resource": "reference.conf"},
                {"implementation": "dontInclude", "resources": [".txt"]}
            ]"#,
        )
        .unwrap();
        assert_eq!(specs[0], TransformerSpec::Services);
        match &specs[1] {
            TransformerSpec::Manifest {
                main_class,
                manifest_entries,
                ..
            } => {
                assert_eq!(main_class.as_deref(), Some("app.Main"));
                assert_eq!(manifest_entries.get("X-Gone"), Some(&None));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(specs[1].build().handles_manifest());
        assert!(!specs[2].build().handles_manifest());
    }
}
