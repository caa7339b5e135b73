// Beat Clock - demo runner
// Ticks at the configured tempo and reports where elapsed wall time falls musically

use beat_clock::{
    ClockConfig, ClockError, ClockResult, ClockScheduler, TimeSignature, create_tick_channel,
    load_config,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Drained every POLL_INTERVAL; only overflows at extreme tempos
const TICK_RINGBUFFER_CAPACITY: usize = 256;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(about = "Run a tempo clock and report beat positions")]
struct Args {
    /// Tempo in beats per minute
    #[arg(short, long, default_value_t = ClockConfig::DEFAULT_BPM)]
    bpm: u32,
    /// Time signature, e.g. 4/4 or 6/8
    #[arg(short, long, default_value = "4/4")]
    signature: TimeSignature,
    /// RON clock config file, overrides --bpm and --signature
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// How long to run, in seconds
    #[arg(long, default_value_t = 4.0)]
    seconds: f64,
    /// Cycle length in beats for the sync report
    #[arg(long, default_value_t = 4.0)]
    cycle_beats: f64,
}

/// Run time from `--seconds`, rejecting negative, non-finite and out-of-range values
fn run_duration(seconds: f64) -> ClockResult<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|e| {
        ClockError::InvalidQueryArgument(format!("invalid run time {} seconds: {}", seconds, e))
    })
}

fn main() -> ClockResult<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ClockConfig::new(args.bpm, args.signature)?,
    };

    let run_time = run_duration(args.seconds)?;
    // Surface a bad cycle length before any tick is scheduled
    config.time_until_sync(0.0, 1.0, args.cycle_beats)?;

    println!("=== Beat Clock ===");
    println!(
        "{} | beat {:.3}s | bar {:.3}s | tick every {:?}",
        config,
        config.beat_length(),
        config.bar_length(),
        config.tick_interval()
    );

    let (forwarder, mut ticks) = create_tick_channel(TICK_RINGBUFFER_CAPACITY);
    let forwarder = Arc::new(forwarder);
    let scheduler = ClockScheduler::new(config).with_observer(&forwarder);

    let started = Instant::now();
    scheduler.start()?;

    while started.elapsed() < run_time {
        thread::sleep(POLL_INTERVAL);

        let received = ticks.drain();
        if received == 0 {
            continue;
        }

        let position = started.elapsed().as_secs_f64();
        let progress = scheduler.percentage_until_sync(position, 1.0, args.cycle_beats)?;
        let remaining = scheduler.time_until_sync(position, 1.0, args.cycle_beats)?;
        println!(
            "{:>8.3}s  beat {}  +{} ticks  cycle {:>5.1}%  next sync in {:.3}s",
            position,
            scheduler.current_beat(position) + 1,
            received,
            progress * 100.0,
            remaining
        );
    }

    scheduler.stop();
    println!(
        "Delivered {} ticks, {} dropped",
        scheduler.tick_count(),
        forwarder.dropped()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_duration() {
        assert_eq!(run_duration(4.0).unwrap(), Duration::from_secs(4));
        assert_eq!(run_duration(0.0).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_run_duration_rejects_unrepresentable_values() {
        for seconds in [-1.0, f64::NAN, f64::INFINITY, 1e30] {
            assert!(matches!(
                run_duration(seconds),
                Err(ClockError::InvalidQueryArgument(_))
            ));
        }
    }

    #[test]
    fn test_cli_parses_signature_and_cycle() {
        let args = Args::parse_from(["beat_clock", "--signature", "6/8", "--cycle-beats", "0"]);
        assert_eq!(args.signature, TimeSignature::six_eight());

        let config = ClockConfig::new(args.bpm, args.signature).unwrap();
        assert!(matches!(
            config.time_until_sync(0.0, 1.0, args.cycle_beats),
            Err(ClockError::InvalidQueryArgument(_))
        ));
    }
}
