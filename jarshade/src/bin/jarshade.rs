use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use jarshade::{relocation::RelocationRule, ShadeConfig, ShadeEvent, StageProgress};

/// Merge JAR archives into one, relocating packages on the way
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input JARs, merged in this order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output JAR
    #[arg(short, long)]
    output: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Package relocation as FROM=TO, applied after configured relocations
    #[arg(short, long = "relocate", value_name = "FROM=TO")]
    relocations: Vec<String>,

    /// Relocate package names inside .java sources
    #[arg(long)]
    shade_sources: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_relocation(value: &str) -> Result<RelocationRule> {
    let Some((from, to)) = value.split_once('=') else {
        bail!("Relocation {value:?} is not FROM=TO");
    };
    if from.is_empty() || to.is_empty() {
        bail!("Relocation {value:?} has an empty side");
    }
    Ok(RelocationRule::new(from, to))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &args.config {
        Some(path) => ShadeConfig::load(path)?,
        None => ShadeConfig::default(),
    };
    for relocation in &args.relocations {
        config.relocations.push(parse_relocation(relocation)?);
    }
    config.shade_sources_content |= args.shade_sources;

    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{msg:30} {wide_bar} {percent:>3}%") {
        bar.set_style(style);
    }
    let report_progress = |event: ShadeEvent| {
        bar.set_message(event.stage.as_str());
        match event.progress {
            StageProgress::Unknown => bar.set_position(0),
            StageProgress::Percentage(value) => bar.set_position((value * 100.0) as u64),
            StageProgress::Done => bar.set_position(100),
        }
    };

    let summary = jarshade::shade_with_config(
        &config,
        args.inputs.clone(),
        args.output.clone(),
        report_progress,
    )?;
    bar.finish_and_clear();

    let data = fs::read(&args.output)
        .with_context(|| format!("Cannot read back {}", args.output.display()))?;
    println!(
        "{}: {} entries from {} archives, md5 {:x}",
        args.output.display(),
        summary.entries_written,
        summary.archives.len(),
        md5::compute(&data)
    );
    if !summary.overlaps.is_empty() {
        println!("{} overlap groups, see warnings above", summary.overlaps.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocation_arguments() {
        let rule = parse_relocation("org.foo=shaded.org.foo").unwrap();
        assert_eq!(rule, RelocationRule::new("org.foo", "shaded.org.foo"));
        assert!(parse_relocation("org.foo").is_err());
        assert!(parse_relocation("=x").is_err());
    }
}
