// Clock - Recurring tick scheduler
// Fires ticks on a dedicated timer thread at the rate derived from the clock configuration

use super::timeline::{ClockConfig, SharedClockConfig, TimeSignature};
use super::{ClockError, ClockResult};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Receiver of clock ticks.
///
/// Observers are held weakly by the scheduler: dropping the last `Arc` is
/// enough to unsubscribe.
pub trait TickObserver: Send + Sync {
    /// Called on the timer thread once per tick
    fn on_tick(&self);
}

/// Owned per-tick callback
pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    #[default]
    Idle,
    Running,
}

impl ClockState {
    pub fn is_running(&self) -> bool {
        matches!(self, ClockState::Running)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct TickListeners {
    observers: Vec<Weak<dyn TickObserver>>,
    on_tick: Option<TickCallback>,
}

/// Listener registry shared between the scheduler and its timer thread
#[derive(Default)]
struct TickDispatch {
    listeners: Mutex<TickListeners>,
    // Held for a whole delivery so ticks never overlap, even while an old
    // timer is still winding down next to its replacement.
    firing: Mutex<()>,
    delivered: AtomicU64,
}

impl TickDispatch {
    fn fire(&self) {
        let _firing = lock(&self.firing);

        let (observers, on_tick) = {
            let mut listeners = lock(&self.listeners);
            listeners.observers.retain(|observer| observer.strong_count() > 0);
            let live: Vec<Arc<dyn TickObserver>> =
                listeners.observers.iter().filter_map(Weak::upgrade).collect();
            (live, listeners.on_tick.clone())
        };

        for observer in observers {
            if panic::catch_unwind(AssertUnwindSafe(|| observer.on_tick())).is_err() {
                log::error!("Tick observer panicked, remaining listeners still notified");
            }
        }

        if let Some(callback) = on_tick {
            if panic::catch_unwind(AssertUnwindSafe(|| (*callback)())).is_err() {
                log::error!("Tick callback panicked");
            }
        }

        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

/// One running timer thread. Dropping it stops the thread.
struct TickTimer {
    interval: Duration,
    stop_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TickTimer {
    fn spawn(interval: Duration, dispatch: Arc<TickDispatch>) -> ClockResult<Self> {
        let (stop_tx, stop_rx) = bounded(1);

        let handle = thread::Builder::new()
            .name("beat-clock-timer".into())
            .spawn(move || run_timer(interval, &stop_rx, &dispatch))
            .map_err(ClockError::TimerSpawn)?;

        Ok(Self {
            interval,
            stop_tx,
            handle: Some(handle),
        })
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());

        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Stopped from inside one of its own ticks; the loop exits
                // as soon as the current dispatch returns.
                return;
            }
            if handle.join().is_err() {
                log::error!("Tick timer thread panicked");
            }
        }
    }
}

fn run_timer(interval: Duration, stop_rx: &Receiver<()>, dispatch: &TickDispatch) {
    // First tick fires immediately
    let mut deadline = Instant::now();

    loop {
        match stop_rx.recv_deadline(deadline) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        dispatch.fire();

        // Deadlines advance from the original schedule, so sleep jitter
        // does not accumulate into drift.
        deadline += interval;

        let now = Instant::now();
        if now > deadline + interval {
            let behind = now - deadline;
            let missed =
                u32::try_from(behind.as_nanos() / interval.as_nanos()).unwrap_or(u32::MAX);
            deadline += interval * missed;
            log::debug!("Tick timer fell behind by {:?}, skipped {} ticks", behind, missed);
        }
    }
}

/// Tick clock
/// Emits ticks at `60 / (bpm * beats_per_bar)` second intervals and answers
/// timing queries against the same configuration.
///
/// The interval is computed once per [`start`](ClockScheduler::start).
/// Changing the tempo or signature while running does not re-arm the timer;
/// call [`restart`](ClockScheduler::restart) to apply it.
pub struct ClockScheduler {
    config: Arc<SharedClockConfig>,
    dispatch: Arc<TickDispatch>,
    timer: Mutex<Option<TickTimer>>,
}

impl ClockScheduler {
    /// Create an idle scheduler owning its configuration
    pub fn new(config: ClockConfig) -> Self {
        Self::with_shared_config(Arc::new(SharedClockConfig::new(config)))
    }

    /// Create with an existing shared configuration (e.g. owned by a transport)
    pub fn with_shared_config(config: Arc<SharedClockConfig>) -> Self {
        Self {
            config,
            dispatch: Arc::new(TickDispatch::default()),
            timer: Mutex::new(None),
        }
    }

    /// Builder form of [`set_observer`](Self::set_observer)
    pub fn with_observer<T: TickObserver + 'static>(self, observer: &Arc<T>) -> Self {
        self.set_observer(observer);
        self
    }

    /// Builder form of [`set_on_tick`](Self::set_on_tick)
    pub fn with_on_tick<F>(self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.set_on_tick(callback);
        self
    }

    /// Get shared configuration (for passing to other threads)
    pub fn shared_config(&self) -> Arc<SharedClockConfig> {
        Arc::clone(&self.config)
    }

    /// Current configuration snapshot
    pub fn config(&self) -> ClockConfig {
        self.config.snapshot()
    }

    pub fn bpm(&self) -> u32 {
        self.config.bpm()
    }

    /// Set tempo, effective for queries immediately and for ticks on next start
    pub fn set_bpm(&self, bpm: u32) -> ClockResult<()> {
        self.config.set_bpm(bpm)
    }

    pub fn signature(&self) -> TimeSignature {
        self.config.signature()
    }

    /// Set time signature, effective for queries immediately and for ticks on next start
    pub fn set_signature(&self, signature: TimeSignature) -> ClockResult<()> {
        self.config.set_signature(signature)
    }

    /// Replace every registered observer with `observer`
    pub fn set_observer<T: TickObserver + 'static>(&self, observer: &Arc<T>) {
        let weak = Arc::downgrade(observer) as Weak<dyn TickObserver>;
        lock(&self.dispatch.listeners).observers = vec![weak];
    }

    /// Register an additional observer, notified after the existing ones
    pub fn add_observer<T: TickObserver + 'static>(&self, observer: &Arc<T>) {
        let weak = Arc::downgrade(observer) as Weak<dyn TickObserver>;
        lock(&self.dispatch.listeners).observers.push(weak);
    }

    pub fn clear_observers(&self) {
        lock(&self.dispatch.listeners).observers.clear();
    }

    /// Number of registered observers that are still alive
    pub fn observer_count(&self) -> usize {
        lock(&self.dispatch.listeners)
            .observers
            .iter()
            .filter(|observer| observer.strong_count() > 0)
            .count()
    }

    /// Set the callback invoked after the observers on every tick
    pub fn set_on_tick<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.dispatch.listeners).on_tick = Some(Arc::new(callback));
    }

    pub fn clear_on_tick(&self) {
        lock(&self.dispatch.listeners).on_tick = None;
    }

    pub fn has_on_tick(&self) -> bool {
        lock(&self.dispatch.listeners).on_tick.is_some()
    }

    /// Start ticking, replacing any timer that is already running
    pub fn start(&self) -> ClockResult<()> {
        let config = self.config.snapshot();
        let interval = config.tick_interval();
        log::debug!("Tick interval at {}: {:?}", config, interval);

        // Timers are joined outside the slot lock so a listener calling
        // stop() from the timer thread cannot deadlock against us.
        let previous = lock(&self.timer).take();
        drop(previous);

        let timer = TickTimer::spawn(interval, Arc::clone(&self.dispatch))?;
        let stale = lock(&self.timer).replace(timer);
        drop(stale);

        log::info!("Clock started at {}", config);
        Ok(())
    }

    /// Stop ticking
    /// No tick is delivered after this returns, unless called from a tick itself
    pub fn stop(&self) {
        let timer = lock(&self.timer).take();
        if let Some(timer) = timer {
            drop(timer);
            log::info!("Clock stopped after {} ticks", self.tick_count());
        }
    }

    /// Stop and start again, picking up configuration changes
    pub fn restart(&self) -> ClockResult<()> {
        self.stop();
        self.start()
    }

    pub fn state(&self) -> ClockState {
        if lock(&self.timer).is_some() {
            ClockState::Running
        } else {
            ClockState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Firing period of the active timer, if running
    pub fn interval(&self) -> Option<Duration> {
        lock(&self.timer).as_ref().map(|timer| timer.interval)
    }

    /// Ticks delivered since construction
    pub fn tick_count(&self) -> u64 {
        self.dispatch.delivered.load(Ordering::Relaxed)
    }

    /// Duration of one meter-adjusted beat in seconds
    pub fn beat_length(&self) -> f64 {
        self.config.snapshot().beat_length()
    }

    /// Duration of one bar in seconds
    pub fn bar_length(&self) -> f64 {
        self.config.snapshot().bar_length()
    }

    /// Zero-based beat within the bar at `position` seconds
    pub fn current_beat(&self, position: f64) -> u32 {
        self.config.snapshot().current_beat(position)
    }

    pub fn time_until_sync(&self, position: f64, speed: f64, cycle_beats: f64) -> ClockResult<f64> {
        self.config
            .snapshot()
            .time_until_sync(position, speed, cycle_beats)
    }

    pub fn percentage_until_sync(
        &self,
        position: f64,
        speed: f64,
        cycle_beats: f64,
    ) -> ClockResult<f64> {
        self.config
            .snapshot()
            .percentage_until_sync(position, speed, cycle_beats)
    }
}

impl Default for ClockScheduler {
    fn default() -> Self {
        Self::new(ClockConfig::default())
    }
}

impl Drop for ClockScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
