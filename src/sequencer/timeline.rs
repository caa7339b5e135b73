// Timeline - Musical time representation
// Tempo and meter configuration plus the beat/bar/cycle arithmetic built on it

use super::{ClockError, ClockResult};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar (typically 3, 4, 5, 6, 7)
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature
    /// Both parts must be greater than zero
    pub fn new(numerator: u8, denominator: u8) -> ClockResult<Self> {
        let signature = Self {
            numerator,
            denominator,
        };
        signature.validate()?;
        Ok(signature)
    }

    /// Common 4/4 time signature
    pub const fn four_four() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }

    /// Common 3/4 time signature (waltz)
    pub const fn three_four() -> Self {
        Self {
            numerator: 3,
            denominator: 4,
        }
    }

    /// Common 6/8 time signature
    pub const fn six_eight() -> Self {
        Self {
            numerator: 6,
            denominator: 8,
        }
    }

    /// Check that both parts are usable as divisors
    pub fn validate(&self) -> ClockResult<()> {
        if self.numerator == 0 {
            return Err(ClockError::InvalidConfiguration(format!(
                "time signature {} has zero beats per bar",
                self
            )));
        }
        if self.denominator == 0 {
            return Err(ClockError::InvalidConfiguration(format!(
                "time signature {} has a zero note value",
                self
            )));
        }
        Ok(())
    }

    /// Number of beats per bar
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64
    }

    /// Meter scaling applied to the metronome beat
    /// Example: 4/4 = 1.0, 6/8 = 0.75, 3/4 = 0.75
    pub fn meter_ratio(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = ClockError;

    /// Parses "N/D", e.g. "6/8"
    fn from_str(s: &str) -> ClockResult<Self> {
        let invalid =
            || ClockError::InvalidConfiguration(format!("cannot parse time signature '{}'", s));
        let (numerator, denominator) = s.trim().split_once('/').ok_or_else(invalid)?;
        let numerator = numerator.trim().parse().map_err(|_| invalid())?;
        let denominator = denominator.trim().parse().map_err(|_| invalid())?;
        Self::new(numerator, denominator)
    }
}

#[derive(serde::Deserialize)]
struct RawClockConfig {
    bpm: u32,
    #[serde(default)]
    signature: TimeSignature,
}

impl TryFrom<RawClockConfig> for ClockConfig {
    type Error = ClockError;

    fn try_from(raw: RawClockConfig) -> ClockResult<Self> {
        Self::new(raw.bpm, raw.signature)
    }
}

/// Tempo and meter driving both the tick scheduler and the timing queries.
///
/// All lengths returned by the query methods are in seconds, and every
/// position argument is expected in seconds as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawClockConfig")]
pub struct ClockConfig {
    bpm: u32,
    signature: TimeSignature,
}

impl ClockConfig {
    /// Default tempo for a freshly created clock
    pub const DEFAULT_BPM: u32 = 120;

    /// Creates a validated configuration
    pub fn new(bpm: u32, signature: TimeSignature) -> ClockResult<Self> {
        let config = Self { bpm, signature };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClockResult<()> {
        if self.bpm == 0 {
            return Err(ClockError::InvalidConfiguration(
                "BPM must be greater than 0".to_string(),
            ));
        }
        self.signature.validate()
    }

    /// Get BPM value
    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Set BPM value, keeping the previous one on rejection
    pub fn set_bpm(&mut self, bpm: u32) -> ClockResult<()> {
        Self::new(bpm, self.signature)?;
        self.bpm = bpm;
        Ok(())
    }

    /// Get time signature
    pub fn signature(&self) -> TimeSignature {
        self.signature
    }

    /// Replace the time signature, keeping the previous one on rejection
    pub fn set_signature(&mut self, signature: TimeSignature) -> ClockResult<()> {
        signature.validate()?;
        self.signature = signature;
        Ok(())
    }

    /// Duration of one metronome (quarter-note-equivalent) beat in seconds
    pub fn quarter_length(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    /// Duration of one meter-adjusted beat in seconds
    pub fn beat_length(&self) -> f64 {
        self.quarter_length() * self.signature.meter_ratio()
    }

    /// Duration of one full bar in seconds
    pub fn bar_length(&self) -> f64 {
        self.beat_length() * self.signature.beats_per_bar()
    }

    /// Zero-based beat index within the current bar.
    ///
    /// Counts metronome beats (`60 / bpm`), not meter-adjusted ones. Negative
    /// positions wrap with Euclidean modulo so the index never goes negative.
    /// A non-finite position, or one so large that the beat count overflows
    /// to infinity, maps to beat 0.
    pub fn current_beat(&self, position: f64) -> u32 {
        let beats_elapsed = (position / self.quarter_length()).floor();
        if !beats_elapsed.is_finite() {
            return 0;
        }
        beats_elapsed.rem_euclid(self.signature.beats_per_bar()) as u32
    }

    /// Time left until the next boundary of a cycle spanning `cycle_beats`
    /// beats, scaled by the playback `speed` multiplier.
    pub fn time_until_sync(&self, position: f64, speed: f64, cycle_beats: f64) -> ClockResult<f64> {
        check_sync_arguments(position, speed, cycle_beats)?;
        let cycle_length = self.beat_length() * cycle_beats;
        if !(cycle_length > 0.0 && cycle_length.is_finite()) {
            return Err(ClockError::InvalidQueryArgument(format!(
                "cycle of {} beats has no representable length at {}",
                cycle_beats, self
            )));
        }
        let mut elapsed_into_cycle = position.rem_euclid(cycle_length);
        // rem_euclid rounds tiny negative positions up to the modulus itself
        if elapsed_into_cycle >= cycle_length {
            elapsed_into_cycle = 0.0;
        }
        let remaining = (cycle_length - elapsed_into_cycle) / speed;
        if !remaining.is_finite() {
            return Err(ClockError::InvalidQueryArgument(format!(
                "speed {} overflows the time until sync",
                speed
            )));
        }
        Ok(remaining)
    }

    /// Fractional progress through the current cycle, in `[0, 1)`
    pub fn percentage_until_sync(
        &self,
        position: f64,
        speed: f64,
        cycle_beats: f64,
    ) -> ClockResult<f64> {
        let full = self.time_until_sync(0.0, speed, cycle_beats)?;
        let remaining = self.time_until_sync(position, speed, cycle_beats)?;
        Ok((full - remaining) / full)
    }

    /// Firing period of the tick scheduler: `60 / (bpm * beats_per_bar)`.
    ///
    /// This is a subdivision of the metronome beat and intentionally differs
    /// from [`ClockConfig::beat_length`]. Floors at one nanosecond.
    pub fn tick_interval(&self) -> Duration {
        let seconds = 60.0 / (self.bpm as f64 * self.signature.beats_per_bar());
        Duration::from_secs_f64(seconds).max(Duration::from_nanos(1))
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            bpm: Self::DEFAULT_BPM,
            signature: TimeSignature::default(),
        }
    }
}

impl fmt::Display for ClockConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM {}", self.bpm, self.signature)
    }
}

fn check_sync_arguments(position: f64, speed: f64, cycle_beats: f64) -> ClockResult<()> {
    if !position.is_finite() {
        return Err(ClockError::InvalidQueryArgument(format!(
            "position must be finite, got {}",
            position
        )));
    }
    if speed == 0.0 || !speed.is_finite() {
        return Err(ClockError::InvalidQueryArgument(format!(
            "speed must be finite and nonzero, got {}",
            speed
        )));
    }
    if cycle_beats <= 0.0 || !cycle_beats.is_finite() {
        return Err(ClockError::InvalidQueryArgument(format!(
            "cycle length must be a positive number of beats, got {}",
            cycle_beats
        )));
    }
    Ok(())
}

/// Shared clock configuration
/// Mutex-guarded so every reader sees bpm and signature from the same update
#[derive(Debug, Default)]
pub struct SharedClockConfig {
    inner: Mutex<ClockConfig>,
}

impl SharedClockConfig {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            inner: Mutex::new(config),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockConfig> {
        // ClockConfig is Copy and every write is a single assignment, so a
        // poisoned lock still holds a consistent value.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent copy of the current configuration
    pub fn snapshot(&self) -> ClockConfig {
        *self.lock()
    }

    pub fn bpm(&self) -> u32 {
        self.lock().bpm()
    }

    pub fn signature(&self) -> TimeSignature {
        self.lock().signature()
    }

    pub fn set_bpm(&self, bpm: u32) -> ClockResult<()> {
        self.lock().set_bpm(bpm).inspect_err(|e| {
            log::warn!("Rejected tempo change: {}", e);
        })
    }

    pub fn set_signature(&self, signature: TimeSignature) -> ClockResult<()> {
        self.lock().set_signature(signature).inspect_err(|e| {
            log::warn!("Rejected time signature change: {}", e);
        })
    }

    /// Replace the whole configuration at once
    pub fn replace(&self, config: ClockConfig) -> ClockResult<()> {
        config.validate()?;
        *self.lock() = config;
        Ok(())
    }
}
