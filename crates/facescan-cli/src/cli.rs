use crate::config::Config;
use clap::Parser;
use facescan_core::{MissingFilePolicy, ScanOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "facescan", about = "Capture faces from a camera and keep a scan log")]
pub struct Cli {
    /// Directory to store face data
    #[arg(long, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Don't save face images
    #[arg(long)]
    pub no_save: bool,

    /// Don't show the preview or read keyboard controls
    #[arg(long)]
    pub no_display: bool,

    /// Show scanning statistics
    #[arg(long)]
    pub stats: bool,

    /// List all scanned faces
    #[arg(long)]
    pub list_faces: bool,

    /// Clean up faces older than N days
    #[arg(long, value_name = "DAYS")]
    pub cleanup: Option<u64>,

    /// Export the scan log to CSV (default: scan_log_<timestamp>.csv)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub export: Option<Option<PathBuf>>,

    /// During cleanup, also drop log entries whose image is already missing
    #[arg(long)]
    pub prune_missing: bool,

    /// V4L2 camera device
    #[arg(long, value_name = "PATH")]
    pub device: Option<String>,

    /// Directory containing det_10g.onnx
    #[arg(long, value_name = "PATH")]
    pub model_dir: Option<PathBuf>,
}

/// The single action one invocation performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Stats,
    ListFaces,
    Cleanup(u64),
    Export(Option<PathBuf>),
    Scan(ScanOptions),
}

impl Cli {
    /// First matching mode flag wins: stats, list-faces, cleanup, export.
    pub fn mode(&self) -> Mode {
        if self.stats {
            Mode::Stats
        } else if self.list_faces {
            Mode::ListFaces
        } else if let Some(days) = self.cleanup {
            Mode::Cleanup(days)
        } else if let Some(path) = &self.export {
            Mode::Export(path.clone())
        } else {
            Mode::Scan(ScanOptions {
                save_images: !self.no_save,
                display: !self.no_display,
            })
        }
    }

    /// Flags take precedence over `FACESCAN_*` variables.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(device) = &self.device {
            config.camera_device = device.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if self.prune_missing {
            config.missing_file_policy = MissingFilePolicy::Prune;
        }
    }
}
