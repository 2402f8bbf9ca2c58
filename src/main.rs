//! Tagcam binary: capture frames, detect a marker, report it.

mod args;

use std::path::Path;
use std::thread;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use args::Args;
use tagcam::pnm::{save_pgm, save_ppm};
use tagcam::traits::Result;
use tagcam::{
    select_marker, yuyv_to_luma, yuyv_to_rgb, AcceptPolicy, BufferPool, CaptureSession, Detector,
    LumaImage, MarkerReport, NullDetector, RgbImage, TelemetrySink, UdpSink, V4L2Device,
};

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(&args) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "tagcam=debug" } else { "tagcam=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: &Args) -> Result<()> {
    let (width, height) = args.resolution();
    let mut handle = V4L2Device::negotiate(&args.camera, width, height)?;
    info!(
        card = %handle.capabilities().card,
        driver = %handle.capabilities().driver,
        format = %handle.format().fourcc,
        width = handle.width(),
        height = handle.height(),
        "camera ready"
    );

    let mut pool = BufferPool::allocate(&mut handle, args.buffers)?;
    let sink = args.telemetry.map(UdpSink::connect).transpose()?;
    if let Some(sink) = &sink {
        info!(address = %sink.target(), "reporting markers over udp");
    }
    let detector = Box::new(NullDetector);
    let mut processor = FrameProcessor::new(args, handle.width(), handle.height(), detector, sink)?;

    {
        let mut session = CaptureSession::new(&mut handle, &mut pool, args.retry_policy());
        session.enqueue_all()?;
        session.start()?;

        let mut processed = 0u64;
        while args.frames == 0 || processed < args.frames {
            let index = session.next_frame()?;
            let frame = session.frame(index)?;
            let sequence = frame.metadata().sequence;
            debug!(index, sequence, len = frame.len(), "processing frame");
            processor.process(frame.data(), sequence);
            session.requeue_one(index)?;
            processed += 1;

            if let Some(delay) = args.frame_delay() {
                thread::sleep(delay);
            }
        }

        session.stop()?;
        info!(processed, found = processor.found, "capture finished");
    }

    pool.release();
    handle.close();
    Ok(())
}

/// Per-frame work between dequeue and requeue.
struct FrameProcessor<'a, S> {
    args: &'a Args,
    policy: AcceptPolicy,
    detector: Box<dyn Detector>,
    sink: Option<S>,
    luma: LumaImage,
    rgb: Option<RgbImage>,
    found: u64,
}

impl<'a, S: TelemetrySink> FrameProcessor<'a, S> {
    fn new(
        args: &'a Args,
        width: u32,
        height: u32,
        detector: Box<dyn Detector>,
        sink: Option<S>,
    ) -> Result<Self> {
        let rgb = if args.dump_rgb && args.dump_dir.is_some() {
            Some(RgbImage::new(width, height)?)
        } else {
            None
        };

        Ok(Self {
            args,
            policy: args.accept_policy(),
            detector,
            sink,
            luma: LumaImage::new(width, height)?,
            rgb,
            found: 0,
        })
    }

    /// Convert, detect and report one frame.
    ///
    /// Per-frame failures are logged and the frame is skipped. A frame that
    /// cannot be converted is still reported, as not found.
    fn process(&mut self, data: &[u8], sequence: u32) {
        if let Err(err) = yuyv_to_luma(data, &mut self.luma) {
            error!(sequence, "dropping frame: {err}");
            self.report(sequence, MarkerReport::NOT_FOUND);
            return;
        }

        let report = self.detect(sequence);
        self.report(sequence, report);

        let args = self.args;
        if let Some(dir) = &args.dump_dir {
            if args.dump_every > 0 && u64::from(sequence) % args.dump_every == 0 {
                if let Err(err) = self.dump(dir, data, sequence) {
                    warn!(sequence, "frame dump failed: {err}");
                }
            }
        }
    }

    fn detect(&mut self, sequence: u32) -> MarkerReport {
        let detections = self.detector.detect(&self.luma);
        let marker = select_marker(&detections, &self.policy);
        match &marker {
            Some(marker) => {
                self.found += 1;
                info!(sequence, id = marker.id, hamming = marker.hamming, "marker detected");
            }
            None => debug!(sequence, candidates = detections.len(), "no marker detected"),
        }
        MarkerReport::from_detection(marker.as_ref())
    }

    fn report(&mut self, sequence: u32, report: MarkerReport) {
        if let Some(sink) = &mut self.sink {
            if let Err(err) = sink.send(report) {
                warn!(sequence, "telemetry send failed: {err}");
            }
        }
    }

    fn dump(&mut self, dir: &Path, data: &[u8], sequence: u32) -> Result<()> {
        save_pgm(dir.join(format!("frame-{sequence:06}.pgm")), &self.luma)?;

        if let Some(rgb) = &mut self.rgb {
            yuyv_to_rgb(data, rgb)?;
            save_ppm(dir.join(format!("frame-{sequence:06}.ppm")), rgb)?;
        }
        Ok(())
    }
}
