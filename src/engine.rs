//! The pattern execution engine: a timed loop that turns a mode's frame
//! rule into a live stream of serial frames.
//!
//! States run `Idle -> Running -> Stopping`. Each iteration asks the mode's
//! rule for the frames at the current tick, writes them through the sink on
//! a blocking task (frame writes are never abandoned mid-write), then sleeps
//! for the cadence interval. Cancellation arrives on a `watch` channel and
//! is observed before and after every sleep; it takes effect only between
//! frames, never inside one. One-shot modes send their tick-0 frames and
//! terminate without entering the long-lived loop.
//!
//! A write failure terminates the loop: after a partial failure the
//! firmware's visual state is unknown and must not be masked by retries.

use crate::config::PatternConfig;
use crate::error::{LedError, LedResult};
use crate::protocol::{self, Cadence, Mode};
use crate::transport::FrameSink;
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Engine lifecycle state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed, not yet started.
    Idle,
    /// Producing frames.
    Running,
    /// Cancellation observed; flushing the final frame.
    Stopping,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => f.write_str("idle"),
            EngineState::Running => f.write_str("running"),
            EngineState::Stopping => f.write_str("stopping"),
        }
    }
}

/// Timed frame generator bound to one sink for its whole life.
pub struct PatternEngine<S: FrameSink + 'static> {
    sink: Arc<Mutex<S>>,
    mode: Mode,
    config: PatternConfig,
    link_delay: Duration,
    state: EngineState,
}

impl<S: FrameSink + 'static> PatternEngine<S> {
    /// Bind a validated mode/config pair to a sink. `link_delay` is the
    /// serial inter-byte delay, which still-color cadences derive from.
    pub fn new(sink: S, mode: Mode, config: PatternConfig, link_delay: Duration) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            mode,
            config,
            link_delay,
            state: EngineState::Idle,
        }
    }

    fn transition(&mut self, next: EngineState) {
        debug!("engine {} -> {} ({})", self.state, next, self.mode);
        self.state = next;
    }

    /// Drive the loop until the mode completes (one-shot) or `cancel`
    /// observes `true` (or its sender disappears, which counts as a stop
    /// request). Consumes the engine; configs are immutable once started.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> LedResult<()> {
        self.transition(EngineState::Running);
        let cadence = (self.mode.rule().cadence)(&self.config, self.link_delay);
        let mut tick: u64 = 0;

        loop {
            if *cancel.borrow() {
                break;
            }

            let frames = protocol::encode(self.mode, &self.config, tick)?;
            let sink = Arc::clone(&self.sink);
            let write = tokio::task::spawn_blocking(move || {
                let mut sink = sink.blocking_lock();
                for frame in &frames {
                    sink.write_frame(frame)?;
                }
                Ok::<(), LedError>(())
            })
            .await
            .map_err(|e| LedError::Io(std::io::Error::other(e)))?;
            if let Err(err) = write {
                warn!("frame write failed, terminating loop: {err}");
                self.transition(EngineState::Stopping);
                return Err(err);
            }

            let interval = match cadence {
                Cadence::OneShot => {
                    debug!("one-shot {} sent", self.mode);
                    break;
                }
                Cadence::Periodic(interval) => interval,
            };

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() {
                        // Controller dropped the sender; treat as a stop.
                        break;
                    }
                }
                () = tokio::time::sleep(interval) => {}
            }
            if *cancel.borrow() {
                break;
            }
            tick = tick.wrapping_add(1);
        }

        self.transition(EngineState::Stopping);
        info!("pattern {} stopped after {} tick(s)", self.mode, tick);
        Ok(())
    }
}
