use std::path::PathBuf;

use clap::Parser;

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

/// Sends drip email campaigns
#[derive(Parser, Debug)]
#[command(name = "drip", version, about, long_about = None)]
struct Cli {
    /// Configuration file, overriding the usual lookup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let drip = drip::controller::Drip::load(&config_path)?;

    if cli.once {
        drip.run_once().await.map(|_| ())
    } else {
        drip.run().await
    }
}

/// Find the configuration file using the following precedence:
/// 1. `DRIP_CONFIG` environment variable
/// 2. ./drip.config.ron (current working directory)
/// 3. /etc/drip/drip.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("DRIP_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("DRIP_CONFIG points to non-existent file: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./drip.config.ron"),
        PathBuf::from("/etc/drip/drip.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - DRIP_CONFIG environment variable\n{paths_tried}"
    )
}
