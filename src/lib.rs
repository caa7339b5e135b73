// Beat Clock - Library exports for the demo binary, tests and benchmarks

pub mod config;
pub mod messaging;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use config::{load_config, parse_config, serialize_config};
pub use messaging::channels::{Tick, TickConsumer, TickForwarder, create_tick_channel};
pub use sequencer::{
    ClockConfig, ClockError, ClockResult, ClockScheduler, ClockState, SharedClockConfig,
    TickObserver, TimeSignature,
};
