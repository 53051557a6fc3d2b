use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use originscope::pipeline::AnalysisController;
use originscope::subject::Submission;
use originscope::{cli, config, logging};

fn main() -> Result<()> {
    let cli_opts = cli::parse();
    logging::init_logging(cli_opts.log_format.into());

    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut cfg = loaded.config;
    if let Some(workers) = cli_opts.workers {
        cfg.workers = workers;
    }
    info!(
        "starting input={} workers={} config_hash={}",
        cli_opts.input.display(),
        cfg.effective_workers(),
        loaded.config_hash
    );

    let submission = Submission::from_path(&cli_opts.input)
        .with_context(|| format!("reading {}", cli_opts.input.display()))?;
    let controller = AnalysisController::with_builtins(cfg)?;
    let report = controller.analyze(submission, Duration::from_secs(cli_opts.timeout_secs))?;

    let json = if cli_opts.pretty {
        report.to_json_pretty()?
    } else {
        report.to_json()?
    };
    match &cli_opts.output {
        Some(path) => {
            std::fs::write(path, json.as_bytes())
                .with_context(|| format!("writing {}", path.display()))?;
            info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }

    info!(
        "originscope finished score={} tier={}",
        report.overall_score,
        report.tier.label()
    );
    controller.shutdown();
    Ok(())
}
