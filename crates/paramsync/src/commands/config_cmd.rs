//! Config subcommand handlers.

use std::path::PathBuf;

use paramsync_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = paramsync_config::load_config(global.config.as_deref())?;
            let rendered = match global.output {
                OutputFormat::Json => output::render_json(&cfg, false)?,
                OutputFormat::JsonCompact => output::render_json(&cfg, true)?,
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)?,
            };
            output::print_output(rendered.trim_end(), global.quiet);
        }

        ConfigCommand::Path => {
            output::print_output(&resolve_path(global).display().to_string(), global.quiet);
        }

        ConfigCommand::Init { force } => {
            let path = resolve_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            let written = paramsync_config::save_config(&Config::default(), Some(&path))?;
            tracing::info!(path = %written.display(), "config written");
            output::print_output(&format!("Wrote {}", written.display()), global.quiet);
        }
    }
    Ok(())
}

fn resolve_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(paramsync_config::config_path)
}
