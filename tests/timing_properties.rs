//! Property checks for the timing queries
//!
//! Randomized over tempo, meter, speed and cycle length with a fixed seed so
//! failures reproduce.

use beat_clock::{ClockConfig, ClockError, TimeSignature};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ITERATIONS: usize = 500;

fn random_config(rng: &mut StdRng) -> ClockConfig {
    let signature = TimeSignature::new(rng.gen_range(1..=16), rng.gen_range(1..=32)).unwrap();
    ClockConfig::new(rng.gen_range(1..=1000), signature).unwrap()
}

fn random_speed(rng: &mut StdRng) -> f64 {
    let magnitude = rng.gen_range(0.1..4.0);
    if rng.gen_bool(0.2) { -magnitude } else { magnitude }
}

#[test]
fn test_beat_length_positive_and_bar_consistent() {
    let mut rng = StdRng::seed_from_u64(1);

    for _ in 0..ITERATIONS {
        let config = random_config(&mut rng);
        let beat = config.beat_length();
        assert!(beat > 0.0 && beat.is_finite(), "{}: beat {}", config, beat);

        let expected_bar = beat * config.signature().numerator as f64;
        assert!(
            (config.bar_length() - expected_bar).abs() <= expected_bar * 1e-12,
            "{}: bar {} vs {}",
            config,
            config.bar_length(),
            expected_bar
        );
    }
}

#[test]
fn test_percentage_is_zero_at_cycle_start() {
    let mut rng = StdRng::seed_from_u64(2);

    for _ in 0..ITERATIONS {
        let config = random_config(&mut rng);
        let speed = random_speed(&mut rng);
        let cycle_beats = rng.gen_range(0.25..16.0);
        assert_eq!(
            config.percentage_until_sync(0.0, speed, cycle_beats).unwrap(),
            0.0
        );
    }
}

#[test]
fn test_percentage_monotonic_within_cycle_and_wraps() {
    let mut rng = StdRng::seed_from_u64(3);

    for _ in 0..100 {
        let config = random_config(&mut rng);
        let speed = random_speed(&mut rng);
        let cycle_beats = rng.gen_range(1..=8) as f64;
        let cycle_length = config.beat_length() * cycle_beats;

        let mut previous = 0.0;
        for step in 0..200 {
            let position = cycle_length * step as f64 / 200.0;
            let progress = config
                .percentage_until_sync(position, speed, cycle_beats)
                .unwrap();
            assert!((0.0..1.0).contains(&progress), "progress {}", progress);
            assert!(progress >= previous, "{} then {}", previous, progress);
            previous = progress;
        }

        // Landing exactly on the next boundary starts a new cycle
        assert_eq!(
            config
                .percentage_until_sync(cycle_length, speed, cycle_beats)
                .unwrap(),
            0.0
        );
    }
}

#[test]
fn test_time_until_sync_bounded_by_cycle() {
    let mut rng = StdRng::seed_from_u64(4);

    for _ in 0..ITERATIONS {
        let config = random_config(&mut rng);
        let cycle_beats = rng.gen_range(0.5..8.0);
        let cycle_length = config.beat_length() * cycle_beats;
        let position = rng.gen_range(-100.0..100.0);

        let remaining = config.time_until_sync(position, 1.0, cycle_beats).unwrap();
        assert!(remaining > 0.0 && remaining <= cycle_length);
    }
}

#[test]
fn test_current_beat_periodic_over_one_bar() {
    let mut rng = StdRng::seed_from_u64(5);

    for _ in 0..ITERATIONS {
        let config = random_config(&mut rng);
        let beats_per_bar = config.signature().numerator;
        let quarter = 60.0 / config.bpm() as f64;
        let period = beats_per_bar as f64 * quarter;

        // Sample mid-beat so rounding never lands on a boundary
        let beat_index: i64 = rng.gen_range(-50..50);
        let position = (beat_index as f64 + 0.5) * quarter;

        let beat = config.current_beat(position);
        assert!(beat < beats_per_bar as u32);
        assert_eq!(beat, config.current_beat(position + period));
        assert_eq!(beat as i64, beat_index.rem_euclid(beats_per_bar as i64));
    }
}

#[test]
fn test_reference_scenario_120_bpm_four_four() {
    let config = ClockConfig::new(120, TimeSignature::four_four()).unwrap();

    assert_eq!(config.beat_length(), 0.5);
    assert_eq!(config.bar_length(), 2.0);
    assert_eq!(config.current_beat(0.75), 1);
    assert_eq!(config.time_until_sync(1.0, 1.0, 4.0).unwrap(), 1.0);
    assert_eq!(config.percentage_until_sync(1.0, 1.0, 4.0).unwrap(), 0.5);
}

#[test]
fn test_invalid_arguments_fail_fast() {
    let config = ClockConfig::default();

    assert!(matches!(
        config.time_until_sync(1.0, 0.0, 4.0),
        Err(ClockError::InvalidQueryArgument(_))
    ));
    assert!(matches!(
        config.percentage_until_sync(1.0, 1.0, 0.0),
        Err(ClockError::InvalidQueryArgument(_))
    ));
    assert!(matches!(
        ClockConfig::new(0, TimeSignature::four_four()),
        Err(ClockError::InvalidConfiguration(_))
    ));
}
