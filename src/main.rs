// Motion Music replay
// Feeds recorded hand-pose records (one JSON object per line) through a session
// and saves the resulting MIDI log

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use motion_music_lib::config::default_midi_output_path;
use motion_music_lib::pipeline::{rodio_backend_factory, shared_backend_factory};
use motion_music_lib::synth::list_output_devices;
use motion_music_lib::{EngineConfig, HandPoseRecord, MotionSession, NullBackend};

const USAGE: &str = "usage: motion_music <poses.jsonl> [out.mid] [--play] [--config <engine.json>] [--trace <frames.jsonl>]
       motion_music --list-devices";

struct Args {
    poses: PathBuf,
    output: Option<PathBuf>,
    play: bool,
    config: Option<PathBuf>,
    trace: Option<PathBuf>,
}

fn parse_args() -> Result<Option<Args>> {
    let mut positional = Vec::new();
    let mut play = false;
    let mut config = None;
    let mut trace = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--play" => play = true,
            "--config" => {
                config = Some(PathBuf::from(args.next().context("--config needs a path")?))
            }
            "--trace" => {
                trace = Some(PathBuf::from(args.next().context("--trace needs a path")?))
            }
            "--list-devices" => {
                for name in list_output_devices()? {
                    println!("{}", name);
                }
                return Ok(None);
            }
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(None);
            }
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    let poses = match positional.next() {
        Some(path) => path,
        None => bail!("{}", USAGE),
    };

    Ok(Some(Args {
        poses,
        output: positional.next(),
        play,
        config,
        trace,
    }))
}

fn main() -> Result<()> {
    env_logger::init();

    let args = match parse_args()? {
        Some(args) => args,
        None => return Ok(()),
    };

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let factory = if args.play {
        rodio_backend_factory()
    } else {
        shared_backend_factory(Arc::new(NullBackend::new()))
    };

    let mut session = MotionSession::new(config, factory);
    if let Some(trace) = args.trace {
        session = session.with_trace(trace);
    }
    session.start()?;

    let contents = fs::read_to_string(&args.poses)
        .with_context(|| format!("reading {}", args.poses.display()))?;

    let mut previous_timestamp = None;
    let mut skipped = 0usize;
    for (line_number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let record: HandPoseRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Line {}: not a pose record: {}", line_number + 1, e);
                skipped += 1;
                continue;
            }
        };

        // Pace playback by the recorded capture times
        if args.play {
            if let Some(previous) = previous_timestamp {
                let gap: f64 = record.timestamp - previous;
                if gap > 0.0 {
                    thread::sleep(Duration::from_secs_f64(gap.min(1.0)));
                }
            }
            previous_timestamp = Some(record.timestamp);
        }

        session.process_frame(&record)?;
    }

    if args.play {
        // Let the last voices ring out
        thread::sleep(Duration::from_secs_f64(session.config().note_duration));
    }
    session.stop();

    let output = match args.output {
        Some(path) => path,
        None => default_midi_output_path()?,
    };
    session.save_midi(&output)?;

    println!(
        "{} frames, {} MIDI messages{} -> {}",
        session.frame_count(),
        session.sequencer().logged_message_count(),
        if skipped > 0 { format!(", {} lines skipped", skipped) } else { String::new() },
        output.display()
    );

    Ok(())
}
