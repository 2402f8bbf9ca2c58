use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tagcam::{AcceptPolicy, RetryPolicy};

/// Rule for accepting a detected marker.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq, Copy)]
pub enum AcceptMode {
    /// Exact matches of any id, single-bit corrections of valid ids
    Lenient,
    /// Valid ids only, exact or single-bit corrected
    Strict,
}

/// Command-line arguments for the tagcam capture loop.
///
/// Every option can also be set through the environment variable named
/// next to it.
///
/// # Example
///
/// ```bash
/// tagcam --camera /dev/video2 --telemetry 192.168.1.10:5005
///
/// CAMERA=/dev/video2 FRAMES=0 tagcam
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera capture device path
    #[arg(short, long, env = "CAMERA", default_value = "/dev/video0")]
    pub camera: PathBuf,

    /// Requested capture resolution in pixels (width height)
    #[arg(
        long,
        env = "CAMERA_SIZE",
        default_value = "800 600",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub camera_size: Vec<u32>,

    /// Number of memory-mapped buffers shared with the driver
    #[arg(short, long, env = "BUFFERS", default_value = "20")]
    pub buffers: u32,

    /// Interval between retries of a busy device, in milliseconds
    #[arg(long, env = "POLL_INTERVAL", default_value = "100")]
    pub poll_interval: u64,

    /// Give up waiting for a frame after this many attempts (unbounded if unset)
    #[arg(long, env = "MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Number of frames to process; 0 runs until the stream fails
    #[arg(short, long, env = "FRAMES", default_value = "10000")]
    pub frames: u64,

    /// Pause after each requeue, in milliseconds
    #[arg(long, env = "FRAME_DELAY", default_value = "100")]
    pub frame_delay: u64,

    /// UDP address receiving the two-byte marker report of each frame
    #[arg(short, long, env = "TELEMETRY")]
    pub telemetry: Option<SocketAddr>,

    /// Marker acceptance rule
    #[arg(long, env = "ACCEPT", default_value = "lenient", value_enum)]
    pub accept: AcceptMode,

    /// Valid marker ids as a half-open range (first end)
    #[arg(
        long,
        env = "VALID_IDS",
        default_value = "1 9",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub valid_ids: Vec<u32>,

    /// Directory receiving periodic PGM dumps of converted frames
    #[arg(long, env = "DUMP_DIR")]
    pub dump_dir: Option<PathBuf>,

    /// Dump every Nth frame when a dump directory is set
    #[arg(long, env = "DUMP_EVERY", default_value = "100")]
    pub dump_every: u64,

    /// Also dump an RGB (PPM) rendition of each dumped frame
    #[arg(long, env = "DUMP_RGB")]
    pub dump_rgb: bool,

    /// Enable verbose debug logging
    #[arg(short, long, env = "VERBOSE")]
    pub verbose: bool,
}

impl Args {
    /// Requested `(width, height)`.
    pub fn resolution(&self) -> (u32, u32) {
        match self.camera_size.as_slice() {
            &[width, height] => (width, height),
            _ => (800, 600),
        }
    }

    /// Policy for polling a busy device.
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::unbounded(Duration::from_millis(self.poll_interval));
        match self.max_attempts {
            Some(attempts) => policy.with_max_attempts(attempts),
            None => policy,
        }
    }

    /// Marker acceptance rule from `--accept` and `--valid-ids`.
    pub fn accept_policy(&self) -> AcceptPolicy {
        let valid_ids = match self.valid_ids.as_slice() {
            &[first, end] => first..end,
            _ => tagcam::detect::DEFAULT_VALID_IDS,
        };
        match self.accept {
            AcceptMode::Lenient => AcceptPolicy::lenient(valid_ids),
            AcceptMode::Strict => AcceptPolicy::strict(valid_ids),
        }
    }

    /// Pause after each requeue, if any.
    pub fn frame_delay(&self) -> Option<Duration> {
        (self.frame_delay > 0).then(|| Duration::from_millis(self.frame_delay))
    }
}
