// Messaging - forwarding ticks out of the timer thread

pub mod channels;

pub use channels::{Tick, TickConsumer, TickForwarder, create_tick_channel};
