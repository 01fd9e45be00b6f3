//! Command-line arguments for the testbed

use clap::Parser;
use std::path::PathBuf;

/// Headless grid physics testbed
///
/// Drops a voxel ship onto a static ground plane, edits it while it falls and
/// logs the published transforms.
#[derive(Parser, Debug)]
#[command(name = "testbed")]
#[command(about = "Headless grid physics scenario runner")]
pub struct Args {
    /// Number of host ticks to simulate
    #[arg(long, env = "VOXSHIP_TICKS", default_value_t = 200)]
    pub ticks: u64,

    /// Edge length of the spawned hull in voxels
    #[arg(long, env = "VOXSHIP_SIZE", default_value_t = 4)]
    pub size: i32,

    /// Height above the ground at which the hull is spawned
    #[arg(long, env = "VOXSHIP_HEIGHT", default_value_t = 6.0)]
    pub height: f32,

    /// Log grid transforms every N ticks
    #[arg(long, env = "VOXSHIP_LOG_EVERY", default_value_t = 20)]
    pub log_every: u64,

    /// Physics configuration file (RON)
    #[arg(short, long, env = "VOXSHIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Voxel catalog file (RON)
    #[arg(long, env = "VOXSHIP_CATALOG")]
    pub catalog: Option<PathBuf>,
}
