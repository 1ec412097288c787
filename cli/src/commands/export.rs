use anyhow::Context;
use kstlink::Session;

use crate::cli::ExportArgs;
use crate::config::MergedConfig;
use crate::error::{CliResult, split_pair};

/// Export what the plotting process shows, file defaults overridden by `-o`
pub fn execute(args: ExportArgs, config: MergedConfig) -> CliResult<()> {
    let pairs = args
        .options
        .iter()
        .map(|pair| split_pair(pair))
        .collect::<CliResult<Vec<_>>>()?;
    let options = config
        .export
        .with_pairs(pairs)
        .with_context(|| {
            format!(
                "invalid export options (known: {})",
                kstlink::ExportOptions::NAMES.join(", ")
            )
        })?;

    let path = std::path::absolute(&args.path)
        .with_context(|| format!("bad output path: {}", args.path.display()))?;

    let name = config.session.name().to_string();
    let session = Session::connect(config.session)
        .with_context(|| format!("failed to reach session '{name}'"))?;
    session.export(&path, &options)?;

    tracing::info!(path = %path.display(), all_tabs = options.all_tabs, "exported");
    println!("{}", path.display());
    Ok(())
}
