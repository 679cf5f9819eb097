//! JSON merge configuration
//!
//! ```json
//! {
//!   "relocations": [{ "pattern": "org.foo", "shadedPattern": "shaded.org.foo" }],
//!   "filters": [{ "artifact": "guava-*.jar", "excludes": ["META-INF/*.SF"] }],
//!   "transformers": [{ "implementation": "services" }],
//!   "shadeSourcesContent": false,
//!   "minimize": { "artifact": "target/classes", "dependencies": ["lib/foo.jar"] }
//! }
//! ```

use std::{fs, path::Path, path::PathBuf, rc::Rc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    filter::{Filter, MinijarFilter, ProjectClasspath, SimpleFilter},
    pattern::AntPattern,
    relocation::{RelocationRule, Relocator},
    shader::ShadeRequest,
    transform::TransformerSpec,
};

fn default_true() -> bool {
    true
}

fn any_artifact() -> String {
    "*".to_owned()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadeConfig {
    #[serde(default)]
    pub relocations: Vec<RelocationRule>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub transformers: Vec<TransformerSpec>,
    #[serde(default)]
    pub shade_sources_content: bool,
    #[serde(default)]
    pub minimize: Option<MinimizeConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// Glob over input archive file names
    #[serde(default = "any_artifact")]
    pub artifact: String,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default = "default_true")]
    pub exclude_defaults: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimizeConfig {
    #[serde(flatten)]
    pub classpath: ProjectClasspath,
    #[serde(default)]
    pub entry_points: Vec<String>,
}

impl ShadeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Cannot parse config {}", path.display()))
    }

    /// Builds the request for one merge. Transformers are created fresh on
    /// every call.
    pub fn to_request(&self, inputs: Vec<PathBuf>, output: PathBuf) -> Result<ShadeRequest> {
        let relocators = self
            .relocations
            .iter()
            .map(|rule| {
                Relocator::new(rule).with_context(|| {
                    format!(
                        "Invalid relocation of {}",
                        rule.pattern.as_deref().unwrap_or("<none>")
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut simple_filters = Vec::with_capacity(self.filters.len());
        for config in &self.filters {
            let artifact = AntPattern::new(&config.artifact)
                .with_context(|| format!("Invalid artifact pattern {}", config.artifact))?;
            let archives = inputs
                .iter()
                .filter(|input| {
                    input
                        .file_name()
                        .is_some_and(|name| artifact.matches(&name.to_string_lossy()))
                })
                .cloned();
            let filter = SimpleFilter::new(archives, &config.includes, &config.excludes)
                .with_context(|| format!("Invalid filter for {}", config.artifact))?
                .with_exclude_defaults(config.exclude_defaults);
            simple_filters.push(Rc::new(filter));
        }

        let mut filters: Vec<Rc<dyn Filter>> = simple_filters
            .iter()
            .map(|filter| Rc::clone(filter) as Rc<dyn Filter>)
            .collect();
        if let Some(minimize) = &self.minimize {
            let minijar =
                MinijarFilter::new(&minimize.classpath, &simple_filters, &minimize.entry_points)
                    .with_context(|| {
                        format!(
                            "Cannot analyze {} for minimization",
                            minimize.classpath.artifact.display()
                        )
                    })?;
            filters.push(Rc::new(minijar));
        }

        Ok(ShadeRequest {
            inputs,
            output,
            filters,
            relocators,
            transformers: self.transformers.iter().map(TransformerSpec::build).collect(),
            shade_sources_content: self.shade_sources_content,
        })
    }
}
