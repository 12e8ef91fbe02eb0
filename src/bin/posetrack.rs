use clap::{Args, Parser, Subcommand};
use posetrack::{
    pose_input, Config, CountStore, Counts, Gate, LineCounter, MemoryStore, SkeletonTracker, SqliteStore,
    Track, TrackStore,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "posetrack",
    about = "Re-identify pose skeletons across frames and count gate crossings",
    version = "0.1.0"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track skeletons over a directory of per-frame pose JSON files and count crossings
    Count(CountArgs),
    /// Dump every track stored in a database as JSON
    Export(ExportArgs),
}

#[derive(Args)]
struct CountArgs {
    /// Directory of per-frame pose JSON files
    #[arg(short, long)]
    input: PathBuf,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite file for track history (in-memory when omitted)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Per-frame JSON-lines log of tracks and counts
    #[arg(long)]
    log: Option<PathBuf>,
}

#[derive(Args)]
struct ExportArgs {
    /// SQLite file written by `count`
    #[arg(long)]
    db: PathBuf,

    /// Fill unobserved joints from neighbouring frames
    #[arg(long)]
    interpolate: bool,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Serialize, Debug)]
struct TrackLog {
    track_id: u64,
    x: f32,
    y: f32,
}

#[derive(Serialize, Debug)]
struct FrameLog {
    frame: u64,
    tracks: Vec<TrackLog>,
    counts: Counts,
}

struct CountingState<S: TrackStore + CountStore> {
    tracker: SkeletonTracker<S>,
    counter: LineCounter,
    log: Option<BufWriter<File>>,
}

impl<S: TrackStore + CountStore> CountingState<S> {
    fn process_frame(&mut self, path: &Path, frame: u64) -> anyhow::Result<()> {
        let skeletons = pose_input::read_frame(path)?;
        self.tracker.track(&skeletons, frame)?;
        let windows = self.tracker.windows().clone();
        self.counter.record(frame, &windows, self.tracker.store_mut())?;
        self.log_frame(frame)
    }

    fn log_frame(&mut self, frame: u64) -> anyhow::Result<()> {
        let Some(log) = self.log.as_mut() else {
            return Ok(());
        };

        let tracks = self
            .tracker
            .current()
            .iter()
            .map(|(id, skeleton)| {
                let centroid = skeleton.average();
                TrackLog { track_id: *id, x: centroid.x, y: centroid.y }
            })
            .collect();
        let entry = FrameLog { frame, tracks, counts: self.counter.counts() };

        serde_json::to_writer(&mut *log, &entry)?;
        writeln!(log)?;
        Ok(())
    }

    fn run(&mut self, frames: &[PathBuf]) -> anyhow::Result<Counts> {
        for (frame, path) in frames.iter().enumerate() {
            self.process_frame(path, frame as u64)?;

            if (frame + 1) % 100 == 0 {
                let counts = self.counter.counts();
                info!(
                    "Processed {}/{} frames (up {}, down {})",
                    frame + 1,
                    frames.len(),
                    counts.up,
                    counts.down
                );
            }
        }
        if let Some(log) = self.log.as_mut() {
            log.flush()?;
        }
        Ok(self.counter.counts())
    }
}

fn count<S: TrackStore + CountStore>(config: &Config, store: S, frames: &[PathBuf], log: Option<&Path>) -> anyhow::Result<Counts> {
    let log = match log {
        Some(path) => {
            info!("Writing per-frame log to {:?}", path);
            Some(BufWriter::new(File::create(path)?))
        }
        None => None,
    };

    let mut state = CountingState {
        tracker: SkeletonTracker::new(config.tracker.clone(), store)?,
        counter: LineCounter::new(Gate::from_config(&config.gate)?),
        log,
    };
    state.run(frames)
}

fn run_count(args: CountArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}...", path);
            Config::from_file(&path.to_string_lossy())?
        }
        None => Config::default(),
    };
    info!(
        "Tracker: confidence > {}, {} trusted joints, loss window {} frames, max distance {}px",
        config.tracker.confidence_threshold,
        config.tracker.nodes_to_trust,
        config.tracker.frames_to_lost,
        config.tracker.distance_threshold
    );
    info!(
        "Gate: {:?} -> {:?}, width {}",
        config.gate.start, config.gate.end, config.gate.width
    );

    let frames = pose_input::list_frames(&args.input)?;
    if frames.is_empty() {
        warn!("No pose files found in {:?}", args.input);
    }
    info!("Processing {} frames from {:?}", frames.len(), args.input);

    let counts = match &args.db {
        Some(db) => {
            info!("Persisting tracks to {:?}", db);
            count(&config, SqliteStore::open(db)?, &frames, args.log.as_deref())?
        }
        None => count(&config, MemoryStore::new(), &frames, args.log.as_deref())?,
    };

    info!("Counting completed");
    println!("up: {}", counts.up);
    println!("down: {}", counts.down);
    Ok(())
}

fn run_export(args: ExportArgs) -> anyhow::Result<()> {
    let store = SqliteStore::open(&args.db)?;
    let ids = store.track_ids()?;
    info!("Exporting {} tracks from {:?}", ids.len(), args.db);

    let mut tracks = Vec::with_capacity(ids.len());
    for id in ids {
        let track = Track::load(&store, id)?;
        tracks.push(if args.interpolate { track.interpolated() } else { track });
    }

    let json = serde_json::to_string_pretty(&tracks)?;
    match &args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(json.as_bytes())?;
            info!("Tracks saved to {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Count(args) => run_count(args),
        Command::Export(args) => run_export(args),
    }
}
