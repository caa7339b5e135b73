// Communication channels lock-free
// Forwards clock ticks to a consumer thread (e.g. an audio callback) without blocking the timer

use crate::sequencer::TickObserver;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Zero-payload tick event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tick;

/// Producer half: register it as a clock observer
pub struct TickForwarder {
    producer: Mutex<HeapProd<Tick>>,
    dropped: AtomicU64,
}

impl TickForwarder {
    /// Ticks lost because the buffer was full or the producer was busy
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TickObserver for TickForwarder {
    fn on_tick(&self) {
        // try_lock: the timer thread must never wait here
        let pushed = match self.producer.try_lock() {
            Ok(mut producer) => producer.try_push(Tick).is_ok(),
            Err(_) => false,
        };

        if !pushed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("Tick buffer full, tick dropped");
        }
    }
}

/// Consumer half, owned by the thread that reacts to ticks
pub struct TickConsumer {
    consumer: HeapCons<Tick>,
}

impl TickConsumer {
    /// Pop every pending tick, returning how many there were
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.consumer.try_pop().is_some() {
            count += 1;
        }
        count
    }

    /// Ticks waiting to be consumed
    pub fn pending(&self) -> usize {
        self.consumer.occupied_len()
    }
}

pub fn create_tick_channel(capacity: usize) -> (TickForwarder, TickConsumer) {
    let rb = HeapRb::<Tick>::new(capacity);
    let (producer, consumer) = rb.split();
    (
        TickForwarder {
            producer: Mutex::new(producer),
            dropped: AtomicU64::new(0),
        },
        TickConsumer { consumer },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_and_drain() {
        let (forwarder, mut consumer) = create_tick_channel(8);
        assert_eq!(consumer.pending(), 0);

        forwarder.on_tick();
        forwarder.on_tick();
        forwarder.on_tick();

        assert_eq!(consumer.pending(), 3);
        assert_eq!(consumer.drain(), 3);
        assert_eq!(consumer.pending(), 0);
        assert_eq!(forwarder.dropped(), 0);
    }

    #[test]
    fn test_full_buffer_drops_ticks() {
        let (forwarder, mut consumer) = create_tick_channel(2);

        for _ in 0..5 {
            forwarder.on_tick();
        }

        assert_eq!(consumer.drain(), 2);
        assert_eq!(forwarder.dropped(), 3);
    }
}
