use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use ttyharness::{Config, Engine, logging, tftp};

#[derive(Parser, Debug)]
#[command(
    name = "ttyharness",
    about = "Drive an interactive console program from pattern-triggered actions",
    version
)]
struct Args {
    /// Path to the JSON configuration document
    #[arg(short, long)]
    config: PathBuf,

    /// Bind a session variable; overrides the config's `args`
    #[arg(short, long = "arg", value_name = "KEY=VALUE", num_args = 1.., value_parser = parse_key_val)]
    args: Vec<(String, String)>,

    /// Where to write the harness's own log
    #[arg(long, default_value = "ttyharness.log")]
    log_file: PathBuf,
}

fn parse_key_val(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got {:?}", s))?;
    if key.is_empty() {
        return Err(anyhow!("empty variable name in {:?}", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(&args.log_file)?;

    let config = Config::load(&args.config)?;
    tracing::info!(
        "Loaded {} with {} actions, program {:?}",
        args.config.display(),
        config.actions.len(),
        config.program
    );

    let mut vars = config.args.clone();
    vars.extend(args.args);

    if let Some(tftp_config) = &config.tftp {
        tftp::spawn(tftp_config, &vars)
            .await
            .context("Failed to start TFTP server")?;
    }

    let engine = Engine::spawn(Arc::new(config), vars).context("Failed to start session")?;
    engine.run().await
}
