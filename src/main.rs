use std::path::PathBuf;

use clap::{Parser, Subcommand};

use sysd_snapshot::artifact;
use sysd_snapshot::{DepMap, SnapshotBuilder};

#[derive(Parser)]
#[command(name = "sysd-snapshot")]
#[command(about = "Static systemd unit-tree snapshot and dependency analyzer")]
#[command(
    long_about = "sysd-snapshot parses every unit file of a systemd tree (the live \
    host or an unpacked firmware image), reconstructs the unit graph the way \
    systemd would resolve it at boot, and writes JSON artifacts for forensic \
    review. The target tree is never executed."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the master structure from a filesystem tree
    Master {
        /// Filesystem root to crawl (/ or an unpacked image)
        #[arg(short = 'p', long = "path", default_value = "/")]
        path: PathBuf,

        /// Output prefix; the artifact is written as <prefix>_ms.json
        #[arg(short, long, default_value = "snapshot")]
        output: String,

        /// Overwrite existing artifact files
        #[arg(short = 'f', long)]
        force_overwrite: bool,
    },

    /// Build the dependency map from a master structure
    Deps {
        /// Master structure JSON; when omitted, a snapshot of / is built first
        #[arg(short = 'p', long = "path")]
        ms_path: Option<PathBuf>,

        /// Unit to start the dependency map from
        #[arg(short = 't', long, default_value = "default.target")]
        target_unit: String,

        /// Maximum traversal depth (0 = unbounded)
        #[arg(short = 'D', long, default_value_t = 0)]
        depth: u32,

        /// Output prefix; the artifact is written as <prefix>_dm.json
        #[arg(short, long, default_value = "snapshot")]
        output: String,

        /// Overwrite existing artifact files
        #[arg(short = 'f', long)]
        force_overwrite: bool,
    },

    /// Build both artifacts in one pass
    Both {
        /// Filesystem root to crawl (/ or an unpacked image)
        #[arg(short = 'p', long = "path", default_value = "/")]
        path: PathBuf,

        /// Unit to start the dependency map from
        #[arg(short = 't', long, default_value = "default.target")]
        target_unit: String,

        /// Maximum traversal depth (0 = unbounded)
        #[arg(short = 'D', long, default_value_t = 0)]
        depth: u32,

        /// Output prefix for <prefix>_ms.json and <prefix>_dm.json
        #[arg(short, long, default_value = "snapshot")]
        output: String,

        /// Overwrite existing artifact files
        #[arg(short = 'f', long)]
        force_overwrite: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("sysd-snapshot: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        Command::Master {
            path,
            output,
            force_overwrite,
        } => {
            let ms = SnapshotBuilder::new(path).build().await?;
            artifact::write_artifact(&ms, &output, "ms", force_overwrite)?;
        }

        Command::Deps {
            ms_path,
            target_unit,
            depth,
            output,
            force_overwrite,
        } => {
            let ms = match ms_path {
                Some(path) => artifact::load_master(&path)?,
                None => {
                    log::info!("no master struct given, building one from / first");
                    let ms = SnapshotBuilder::new("/").build().await?;
                    artifact::write_artifact(&ms, &output, "ms", force_overwrite)?;
                    ms
                }
            };
            let dm = DepMap::resolve(&ms, &target_unit, depth_limit(depth))?;
            artifact::write_artifact(&dm, &output, "dm", force_overwrite)?;
        }

        Command::Both {
            path,
            target_unit,
            depth,
            output,
            force_overwrite,
        } => {
            let ms = SnapshotBuilder::new(path).build().await?;
            artifact::write_artifact(&ms, &output, "ms", force_overwrite)?;
            let dm = DepMap::resolve(&ms, &target_unit, depth_limit(depth))?;
            artifact::write_artifact(&dm, &output, "dm", force_overwrite)?;
        }
    }

    Ok(())
}

/// A zero depth on the command line means unbounded traversal.
fn depth_limit(depth: u32) -> Option<u32> {
    (depth > 0).then_some(depth)
}
