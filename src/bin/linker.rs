//! cua-link-sim binary
//!
//! Runs the linker against an in-memory scene loaded from a JSON file and
//! prints the resulting proxies and joints.
//!
//! ## Configuration (CLI / env / TOML via `config` crate)
//!
//! | Flag / key                  | Default       | Description                          |
//! |-----------------------------|---------------|--------------------------------------|
//! | `--scene` / `CUA_SCENE`     | *(required)*  | JSON scene description               |
//! | `--owner` / `CUA_OWNER`     | `CUA`         | Owning atom uid                      |
//! | `--pattern`                 | `.*`          | Target body regex                    |
//! | `--mass-scale`              | `0.1`         | Proxy mass / joint mass scale        |
//! | `--debug`                   | off           | Show markers, emit link lines        |
//! | `--restore`                 | off           | Treat the scene as a restored save   |
//! | `--rebuild`                 | off           | Rebuild after the first pass         |
//! | `--control-mode`            | *(none)*      | Bulk control mode to apply at the end|
//! | `--config` / `CUA_LINK_CONFIG` | *(none)*   | TOML file with `LinkerConfig` keys   |
//! | `CUA_LINK_POLL_TIMEOUT_MS`  | `3000`        | Readiness poll ceiling               |
//! | `CUA_LINK_POLL_INTERVAL_MS` | `200`         | Readiness poll step                  |

use anyhow::{Context, Result};
use clap::Parser;
use cua_link::{
    host::RestoreFlag,
    joint::LinkLine,
    linker::{Linker, SyncReport},
    settings::LinkSettings,
    sim::{MemoryScene, SceneDescription, SceneSnapshot},
    types::{ControlMode, LinkStats, LinkerConfig},
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "cua-link-sim", about = "Control-atom linker simulation", version)]
struct Args {
    /// JSON scene description
    #[arg(long, env = "CUA_SCENE")]
    scene: PathBuf,

    /// Owning atom uid
    #[arg(long, env = "CUA_OWNER", default_value = "CUA")]
    owner: String,

    /// Target body pattern (regex)
    #[arg(long, default_value = ".*")]
    pattern: String,

    /// Mass scale applied to proxies and joints
    #[arg(long, default_value_t = 0.1)]
    mass_scale: f32,

    /// Show proxy markers and print link lines
    #[arg(long)]
    debug: bool,

    /// Treat the scene as a restored save instead of a fresh load
    #[arg(long)]
    restore: bool,

    /// Rebuild after the initial pass
    #[arg(long)]
    rebuild: bool,

    /// Bulk control mode applied to every proxy at the end
    #[arg(long, value_parser = parse_control_mode)]
    control_mode: Option<ControlMode>,

    /// Linker configuration file (TOML)
    #[arg(long, env = "CUA_LINK_CONFIG")]
    config: Option<PathBuf>,
}

fn parse_control_mode(s: &str) -> std::result::Result<ControlMode, String> {
    ControlMode::all()
        .into_iter()
        .find(|mode| {
            let label = mode.to_string().replace(' ', "-");
            label.eq_ignore_ascii_case(s) || mode.to_string().eq_ignore_ascii_case(s)
        })
        .ok_or_else(|| format!("unknown control mode '{}'", s))
}

fn load_config(path: Option<&Path>) -> Result<LinkerConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    builder
        .add_source(config::Environment::with_prefix("CUA_LINK").try_parsing(true))
        .build()
        .context("Failed to read linker configuration")?
        .try_deserialize()
        .context("Invalid linker configuration")
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct PassSummary {
    pass: u64,
    linked: Vec<String>,
    skipped: Vec<(String, String)>,
    proxies_created: usize,
    proxies_repaired: usize,
    proxies_removed: usize,
    joints_created: usize,
    joints_removed: usize,
    suppressed: bool,
}

impl From<&SyncReport> for PassSummary {
    fn from(report: &SyncReport) -> Self {
        Self {
            pass: report.pass,
            linked: report.linked.iter().map(|id| id.to_string()).collect(),
            skipped: report
                .skipped
                .iter()
                .map(|(id, reason)| (id.to_string(), reason.to_string()))
                .collect(),
            proxies_created: report.proxies_created,
            proxies_repaired: report.proxies_repaired,
            proxies_removed: report.proxies_removed,
            joints_created: report.joints_created,
            joints_removed: report.joints_removed,
            suppressed: report.suppressed,
        }
    }
}

#[derive(Serialize)]
struct Output {
    passes: Vec<PassSummary>,
    stats: LinkStats,
    links: Vec<LinkLine>,
    scene: SceneSnapshot,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cua_link=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let text = std::fs::read_to_string(&args.scene)
        .with_context(|| format!("Failed to read scene file {}", args.scene.display()))?;
    let desc: SceneDescription =
        serde_json::from_str(&text).context("Failed to parse scene description")?;
    let scene = MemoryScene::from_description(&desc);

    log::info!(
        "Starting cua-link-sim (owner='{}', pattern='{}', mass_scale={}, restore={})",
        args.owner,
        args.pattern,
        args.mass_scale,
        args.restore,
    );

    let settings = LinkSettings {
        pattern: args.pattern,
        debug: args.debug,
        mass_scale: args.mass_scale,
    };
    let mut linker = Linker::with_settings(config, args.owner, settings)?;
    let mut passes = Vec::new();

    linker.init();
    if args.restore {
        let saved = linker.persisted_state()?;
        linker.restore_from_json(&saved)?;
        let report = linker.complete_restore(&scene, RestoreFlag::IDLE).await;
        passes.push(PassSummary::from(&report));
    } else if let Some(report) = linker.tick(&scene, RestoreFlag::IDLE).await {
        passes.push(PassSummary::from(&report));
    }

    if args.rebuild {
        let report = linker.rebuild(&scene, RestoreFlag::IDLE).await;
        passes.push(PassSummary::from(&report));
    }

    if let Some(mode) = args.control_mode {
        linker.apply_control_mode(&scene, mode);
    }

    let output = Output {
        passes,
        stats: linker.stats(&scene),
        links: linker.debug_links(&scene),
        scene: scene.snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
