//! Frame clock.
//!
//! Drives the single recurring task of the runtime. Every tick is fully
//! synchronous and runs, in order:
//!
//! 1. [`Input::update`] (per-frame flush)
//! 2. draining the [`InputBridge`], when one is attached
//! 3. [`Output::update`]
//! 4. [`Output::render`]
//!
//! The loop task only holds a weak reference to the clock, so dropping the
//! runtime ends it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backend::FrameTiming;
use crate::error::RuntimeError;
use crate::events::input::Input;
use crate::resources::inputbridge::InputBridge;
use crate::systems::output::Output;

const STATS_WINDOW: Duration = Duration::from_secs(1);

/// Frame counter plus a rolling frames-per-second estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    frames: u64,
    window_start: Option<Instant>,
    window_frames: u32,
    fps: f64,
}

impl FrameStats {
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames per second over the last completed window.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    fn record(&mut self, now: Instant) {
        self.frames += 1;
        self.window_frames += 1;
        let start = *self.window_start.get_or_insert(now);
        let elapsed = now.duration_since(start);
        if elapsed >= STATS_WINDOW {
            self.fps = f64::from(self.window_frames) / elapsed.as_secs_f64();
            debug!("frame {}: {:.1} fps", self.frames, self.fps);
            self.window_start = Some(now);
            self.window_frames = 0;
        }
    }
}

pub struct FrameClock {
    input: Input,
    output: Rc<Output>,
    bridge: RefCell<Option<InputBridge>>,
    interval: Duration,
    initialized: Cell<bool>,
    running: Cell<bool>,
    start: Cell<Option<Instant>>,
    last: Cell<Option<Instant>>,
    time: Cell<f64>,
    stats: Cell<FrameStats>,
    task: RefCell<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameClock")
            .field("interval", &self.interval)
            .field("initialized", &self.initialized.get())
            .field("running", &self.running.get())
            .field("time", &self.time.get())
            .field("stats", &self.stats.get())
            .finish()
    }
}

impl FrameClock {
    pub fn new(input: Input, output: Rc<Output>, interval: Duration) -> Self {
        Self {
            input,
            output,
            bridge: RefCell::new(None),
            interval,
            initialized: Cell::new(false),
            running: Cell::new(false),
            start: Cell::new(None),
            last: Cell::new(None),
            time: Cell::new(0.0),
            stats: Cell::new(FrameStats::default()),
            task: RefCell::new(None),
        }
    }

    /// Feed pointer commands from `bridge` into the input hub every tick.
    pub fn attach_bridge(&self, bridge: InputBridge) {
        *self.bridge.borrow_mut() = Some(bridge);
    }

    pub fn initialized(&self) -> bool {
        self.initialized.get()
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Milliseconds since `start`, as of the last tick.
    pub fn time(&self) -> f64 {
        self.time.get()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats.get()
    }

    pub fn init(&self) {
        if self.initialized.get() {
            warn!("frame clock already initialized");
            return;
        }
        self.initialized.set(true);
    }

    /// Reset the timeline and spawn the loop on the current `LocalSet`.
    pub fn start(self: &Rc<Self>) -> Result<(), RuntimeError> {
        if !self.initialized.get() {
            return Err(RuntimeError::ClockNotInitialized);
        }
        if self.running.get() {
            warn!("frame clock already running");
            return Ok(());
        }
        self.running.set(true);
        let now = Instant::now();
        self.start.set(Some(now));
        self.last.set(Some(now));
        self.time.set(0.0);
        info!("frame clock started ({:?} per frame)", self.interval);

        let clock: Weak<FrameClock> = Rc::downgrade(self);
        let period = self.interval;
        let handle = tokio::task::spawn_local(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(clock) = clock.upgrade() else {
                    break;
                };
                if !clock.running.get() {
                    break;
                }
                clock.tick();
            }
        });
        if let Some(old) = self.task.borrow_mut().replace(handle) {
            old.abort();
        }
        Ok(())
    }

    pub fn stop(&self) {
        if !self.running.get() {
            return;
        }
        self.running.set(false);
        if let Some(task) = self.task.borrow_mut().take() {
            task.abort();
        }
        debug!("frame clock stopped after {} frames", self.stats.get().frames());
    }

    /// Run one frame now.
    pub fn tick(&self) {
        let now = Instant::now();
        let start = match self.start.get() {
            Some(start) => start,
            None => {
                self.start.set(Some(now));
                now
            }
        };
        let last = self.last.replace(Some(now)).unwrap_or(now);

        let dt = now.duration_since(last).as_secs_f64() * 1000.0;
        let time = now.duration_since(start).as_secs_f64() * 1000.0;
        self.time.set(time);

        self.input.update(time, dt);
        if let Some(bridge) = self.bridge.borrow_mut().as_mut() {
            bridge.drain_into(&self.input, time);
        }
        self.output.update(time, dt);
        self.output.render(&FrameTiming {
            time,
            delta_time_ms: dt,
        });

        let mut stats = self.stats.get();
        stats.record(now);
        self.stats.set(stats);
    }

    pub fn resize(&self, width: u32, height: u32) {
        if let Some(bridge) = self.bridge.borrow_mut().as_mut() {
            bridge.set_viewport(width, height);
        }
        self.output.resize(width, height);
    }

    pub fn dispose(&self) {
        self.stop();
        self.initialized.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessTarget;
    use crate::backend::SharedTarget;
    use crate::pipeline::postfx::{PostFxConfig, PostFxQuality};

    fn clock() -> Rc<FrameClock> {
        let target: SharedTarget = Rc::new(RefCell::new(HeadlessTarget::new(64, 64)));
        let output = Rc::new(Output::new(target, PostFxConfig::preset(PostFxQuality::Off), false));
        Rc::new(FrameClock::new(Input::new(), output, Duration::from_millis(16)))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn start_requires_init() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let clock = clock();
                assert!(matches!(
                    clock.start(),
                    Err(RuntimeError::ClockNotInitialized)
                ));
                clock.init();
                clock.start().unwrap();
                assert!(clock.is_running());
                clock.stop();
                assert!(!clock.is_running());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn loop_ticks_until_stopped() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let clock = clock();
                clock.init();
                clock.start().unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
                let frames = clock.stats().frames();
                assert!(frames >= 5, "only {frames} frames");
                assert!(clock.time() > 0.0);

                clock.stop();
                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(clock.stats().frames(), frames);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn tick_flushes_input_deltas() {
        let clock = clock();
        clock.input.set_wheel(3.0);
        assert_eq!(clock.input.mouse().wheel, 3.0);
        clock.tick();
        assert_eq!(clock.input.mouse().wheel, 0.0);
        assert_eq!(clock.stats().frames(), 1);
    }
}
