//! # SwitchDB Probe
//!
//! Purpose: Connect with a profile file, run one query, and print the rows as
//! JSON lines. Useful for checking credentials and transport settings against
//! a live service.
//!
//! ## Design Principles
//! 1. **Same Path as Callers**: Uses the public `SwitchClient` API only.
//! 2. **Config from Files**: Profile and client settings are TOML documents;
//!    flags cover only what changes per run.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use switch_client::{ClientConfig, ConnectionProfile, Query, SortDirection, SwitchClient};

#[derive(Parser)]
#[command(name = "switch-probe")]
#[command(about = "Run one SwitchDB query and print the rows")]
struct Cli {
    /// Path to the connection profile (TOML)
    #[arg(short, long, env = "SWITCH_PROFILE")]
    profile: PathBuf,

    /// Service location, e.g. `eu`
    #[arg(short, long, env = "SWITCH_LOCATION")]
    location: String,

    /// Optional client configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List to query
    list: String,

    /// Column to order by
    #[arg(long, default_value = "id")]
    order_by: String,

    /// Sort descending instead of ascending
    #[arg(long)]
    desc: bool,

    /// Maximum rows; -1 returns everything
    #[arg(long, default_value_t = switch_client::UNLIMITED, allow_hyphen_values = true)]
    limit: i64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("switch_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let profile_text = std::fs::read_to_string(&cli.profile)
        .with_context(|| format!("reading profile {}", cli.profile.display()))?;
    let profile = ConnectionProfile::from_toml_str(&profile_text).context("parsing profile")?;

    let config = match &cli.config {
        Some(path) => {
            let text =
                std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            ClientConfig::from_toml_str(&text).context("parsing config")?
        }
        None => ClientConfig::default(),
    };

    let client = SwitchClient::with_config(&cli.location, profile, config).context("creating session")?;
    client.connect().context("connecting")?;

    let direction = if cli.desc {
        SortDirection::Descending
    } else {
        SortDirection::Ascending
    };
    let query = Query::on(&cli.list).order_by(direction, &cli.order_by).limit(cli.limit);
    let rows = client.list(&query).with_context(|| format!("listing {}", cli.list));

    // Close channels even when the query failed.
    client.abort().context("closing session")?;

    for row in rows? {
        println!("{row}");
    }
    Ok(())
}
