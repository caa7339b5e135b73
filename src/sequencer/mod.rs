// Sequencer module
// Musical timing model and the tick clock driven by it

pub mod clock;
pub mod timeline;

pub use clock::{ClockScheduler, ClockState, TickObserver};
pub use timeline::{ClockConfig, SharedClockConfig, TimeSignature};

use thiserror::Error;

/// Clock and timing errors
/// All of these are caller mistakes, surfaced immediately and never retried
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid query argument: {0}")]
    InvalidQueryArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn tick timer thread: {0}")]
    TimerSpawn(#[source] std::io::Error),
}

pub type ClockResult<T> = Result<T, ClockError>;
