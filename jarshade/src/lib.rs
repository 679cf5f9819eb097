use std::path::PathBuf;

use anyhow::Context;

pub mod config;
pub mod filter;
pub mod jar;
pub mod overlap;
pub mod pattern;
pub mod relocation;
pub mod shader;
pub mod transform;
pub mod types;

pub use config::ShadeConfig;
pub use shader::{shade, ShadeError, ShadeRequest, ShadeSummary};
pub use types::{ShadeEvent, Stage, StageProgress};

/// Builds a request from `config` and merges `inputs` into `output`
pub fn shade_with_config(
    config: &ShadeConfig,
    inputs: Vec<PathBuf>,
    output: PathBuf,
    report_progress: impl FnMut(ShadeEvent),
) -> anyhow::Result<ShadeSummary> {
    let request = config.to_request(inputs, output.clone())?;
    shade(request, report_progress)
        .with_context(|| format!("Failed to write {}", output.display()))
}
