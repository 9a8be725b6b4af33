// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Double-buffered live overlay.
//!
//! Regenerating the tiles of a visible layer flashes while new tiles stream
//! in. [`CrossfadeScheduler`] keeps two overlays instead: on every tick the
//! hidden one is pointed at the current instant, and once its tiles have had
//! a grace period to arrive the host swaps the two opacities in one step.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::OverlayError;
use crate::host::{MapHost, TransitionOptions};
use crate::overlay::{CrepusculeOptions, OverlayLayer};
use crate::protocol::RasterPool;
use crate::raster::Color;
use crate::time::{Clock, Timestamp};

/// Tint of layer A in debug mode.
pub const DEBUG_COLOR_A: Color = Color::new(70, 0, 0);
/// Tint of layer B in debug mode.
pub const DEBUG_COLOR_B: Color = Color::new(0, 0, 70);

/// Timing of the crossfade loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossfadeConfig {
    /// Time between swaps.
    pub tick_interval: Duration,
    /// Time the hidden layer gets to load its tiles before it is revealed.
    pub grace_delay: Duration,
    /// Length of the opacity swap itself.
    pub fade_duration: Duration,
    /// Tiles rendered at once across both layers.
    pub max_concurrent_tiles: usize,
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            grace_delay: Duration::from_millis(1000),
            fade_duration: Duration::ZERO,
            max_concurrent_tiles: RasterPool::default_limit(),
        }
    }
}

/// One of the two buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSlot {
    A,
    B,
}

/// What a call to [`CrossfadeScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The buffers swapped; `live` is the layer being revealed.
    Swapped { live: LayerSlot },
    /// The previous swap has not settled yet, nothing changed.
    Skipped,
}

#[derive(Debug)]
struct SchedulerState {
    live_is_a: bool,
    settles_at: Option<Timestamp>,
    timer: Option<CancellationToken>,
    unmounted: bool,
}

struct SchedulerCore {
    host: Arc<dyn MapHost>,
    clock: Arc<dyn Clock>,
    config: CrossfadeConfig,
    opacity: f64,
    pool: RasterPool,
    layer_a: OverlayLayer,
    layer_b: OverlayLayer,
    state: Mutex<SchedulerState>,
}

impl SchedulerCore {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self) -> Result<TickOutcome, OverlayError> {
        let mut state = self.lock();
        if state.unmounted {
            return Err(OverlayError::AlreadyUnmounted);
        }

        let now = self.clock.now();
        if let Some(settles_at) = state.settles_at {
            if now < settles_at {
                warn!("Previous crossfade still settling until {}, skipping tick", settles_at);
                return Ok(TickOutcome::Skipped);
            }
        }

        let (hidden, live, revealed) = if state.live_is_a {
            (&self.layer_b, &self.layer_a, LayerSlot::B)
        } else {
            (&self.layer_a, &self.layer_b, LayerSlot::A)
        };

        hidden.set_date(now)?;

        // Both changes share one delay so the host applies them together.
        // Reveal first: a failed fade-out leaves two layers up, never none.
        let transition = TransitionOptions::new(self.config.fade_duration, self.config.grace_delay);
        hidden.set_opacity(self.opacity, transition)?;

        state.live_is_a = revealed == LayerSlot::A;
        state.settles_at = now.checked_add(self.config.grace_delay + self.config.fade_duration);

        let faded = live.set_opacity(0.0, transition);
        if let Err(e) = &faded {
            error!("Failed to fade out previous layer: {}", e);
        }

        // Backgrounded surfaces only pick up the swap when asked to redraw.
        self.host.trigger_repaint();
        debug!("Crossfade to layer {:?} at {}", revealed, now);

        faded.map(|()| TickOutcome::Swapped { live: revealed })
    }

    fn arm(core: &Arc<Self>, handle: &Handle) -> Result<(), OverlayError> {
        let mut state = core.lock();
        if state.unmounted {
            return Err(OverlayError::AlreadyUnmounted);
        }
        if state.timer.is_some() {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let period = core.config.tick_interval.max(Duration::from_millis(1));
        handle.spawn(run_timer(Arc::downgrade(core), cancel.clone(), period));
        state.timer = Some(cancel);

        info!("Crossfade timer started, every {:?}", period);
        Ok(())
    }

    fn disarm(state: &mut SchedulerState) {
        if let Some(cancel) = state.timer.take() {
            cancel.cancel();
            info!("Crossfade timer stopped");
        }
    }
}

async fn run_timer(core: Weak<SchedulerCore>, cancel: CancellationToken, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = interval.tick() => {
                let Some(core) = core.upgrade() else {
                    return;
                };
                match core.tick() {
                    Ok(_) => {}
                    Err(OverlayError::AlreadyUnmounted) => return,
                    Err(e) => error!("Crossfade tick failed: {}", e),
                }
            }
        }
    }
}

/// Owns two overlays and swaps them on a fixed cadence.
pub struct CrossfadeScheduler {
    core: Arc<SchedulerCore>,
}

impl fmt::Debug for CrossfadeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossfadeScheduler")
            .field("config", &self.core.config)
            .field("opacity", &self.core.opacity)
            .field("layer_a", &self.core.layer_a)
            .field("layer_b", &self.core.layer_b)
            .field("state", &*self.core.lock())
            .finish_non_exhaustive()
    }
}

impl CrossfadeScheduler {
    /// Create both overlays. Layer A starts visible at the configured
    /// opacity, layer B transparent; both depict the same instant.
    ///
    /// The timer is not armed; call [`start`](Self::start) or
    /// [`start_when_loaded`](Self::start_when_loaded).
    pub fn new(
        host: Arc<dyn MapHost>,
        clock: Arc<dyn Clock>,
        options: CrepusculeOptions,
        config: CrossfadeConfig,
    ) -> Result<Self, OverlayError> {
        let pool = RasterPool::new(config.max_concurrent_tiles);
        let date = options.date.unwrap_or_else(|| clock.now());
        let opacity = options.opacity.clamp(0.0, 1.0);

        let mut options_a = CrepusculeOptions {
            date: Some(date),
            opacity,
            ..options
        };
        let mut options_b = CrepusculeOptions {
            opacity: 0.0,
            ..options_a
        };
        if options.debug {
            options_a.color = DEBUG_COLOR_A;
            options_b.color = DEBUG_COLOR_B;
        }

        let layer_a = OverlayLayer::with_pool(
            Arc::clone(&host),
            Arc::clone(&clock),
            options_a,
            pool.clone(),
        )?;
        let layer_b = OverlayLayer::with_pool(
            Arc::clone(&host),
            Arc::clone(&clock),
            options_b,
            pool.clone(),
        )?;

        Ok(Self {
            core: Arc::new(SchedulerCore {
                host,
                clock,
                config,
                opacity,
                pool,
                layer_a,
                layer_b,
                state: Mutex::new(SchedulerState {
                    live_is_a: true,
                    settles_at: None,
                    timer: None,
                    unmounted: false,
                }),
            }),
        })
    }

    /// Arm the periodic tick on the current tokio runtime. Does nothing if
    /// already running.
    pub fn start(&self) -> Result<(), OverlayError> {
        if self.core.lock().unmounted {
            return Err(OverlayError::AlreadyUnmounted);
        }
        let handle = current_runtime()?;
        SchedulerCore::arm(&self.core, &handle)
    }

    /// Arm the timer now if the host has loaded, otherwise when it does.
    pub fn start_when_loaded(&self) -> Result<(), OverlayError> {
        if self.core.lock().unmounted {
            return Err(OverlayError::AlreadyUnmounted);
        }
        let handle = current_runtime()?;
        if self.core.host.is_loaded() {
            return SchedulerCore::arm(&self.core, &handle);
        }

        let pending = Arc::downgrade(&self.core);
        self.core.host.on_load(Box::new(move || {
            if let Some(core) = pending.upgrade() {
                if let Err(e) = SchedulerCore::arm(&core, &handle) {
                    error!("Failed to start crossfade timer: {}", e);
                }
            }
        }));
        Ok(())
    }

    /// Disarm the timer. Safe to call when already stopped.
    pub fn stop(&self) {
        SchedulerCore::disarm(&mut self.core.lock());
    }

    /// Run one swap now. This is what the timer calls on every interval.
    pub fn tick(&self) -> Result<TickOutcome, OverlayError> {
        self.core.tick()
    }

    /// Stop the timer and unmount both overlays.
    pub fn unmount(&self) -> Result<(), OverlayError> {
        let mut state = self.core.lock();
        if state.unmounted {
            return Err(OverlayError::AlreadyUnmounted);
        }
        SchedulerCore::disarm(&mut state);
        state.unmounted = true;
        drop(state);

        let a = self.core.layer_a.unmount();
        let b = self.core.layer_b.unmount();
        self.core.pool.close();
        a.and(b)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.lock().timer.is_some()
    }

    /// Whether layer A is the one shown (or being revealed).
    #[must_use]
    pub fn live_is_a(&self) -> bool {
        self.core.lock().live_is_a
    }

    #[must_use]
    pub fn layer(&self, slot: LayerSlot) -> &OverlayLayer {
        match slot {
            LayerSlot::A => &self.core.layer_a,
            LayerSlot::B => &self.core.layer_b,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CrossfadeConfig {
        &self.core.config
    }
}

impl Drop for CrossfadeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn current_runtime() -> Result<Handle, OverlayError> {
    Handle::try_current().map_err(|e| {
        debug!("No tokio runtime: {}", e);
        OverlayError::NoRuntime
    })
}
