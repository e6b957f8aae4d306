//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use tomefetch_core::DownloadSettings;

/// Download a work item's chapters into a `.cbz` archive.
///
/// The manifest URL points at a JSON document describing the item and its
/// chapters. When the network keeps failing the download pauses; press
/// Enter to resume or Ctrl-C to cancel.
#[derive(Parser, Debug)]
#[command(name = "tomefetch")]
#[command(author, version, about)]
pub struct Args {
    /// URL of the item manifest
    #[arg(value_name = "MANIFEST_URL")]
    pub manifest_url: String,

    /// Directory the archive is written to (default: config value, then current directory)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only download these chapter ids (repeatable; default: all chapters)
    #[arg(short = 'c', long = "chapter", value_name = "CHAPTER_ID")]
    pub chapters: Vec<u64>,

    /// Maximum concurrently active jobs (1-16)
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub max_jobs: Option<u8>,

    /// Pause briefly after every page to go easy on the server
    #[arg(long)]
    pub slowdown: bool,

    /// Page cache directory consulted before fetching
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/tomefetch/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Overlays command-line values onto file settings.
    #[must_use]
    pub fn apply_to(&self, mut settings: DownloadSettings) -> DownloadSettings {
        if let Some(dir) = &self.output_dir {
            settings.output_dir = Some(dir.clone());
        }
        if let Some(jobs) = self.max_jobs {
            settings.max_concurrent_jobs = usize::from(jobs);
        }
        if self.slowdown {
            settings.slowdown = true;
        }
        if let Some(dir) = &self.cache_dir {
            settings.cache_dir = Some(dir.clone());
        }
        settings
    }

    /// Default log filter when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
