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

//! A single twilight overlay bound to a host map.
//!
//! An [`OverlayLayer`] registers its own tile protocol, raster source and
//! raster layer, then lets callers change its opacity and the instant its
//! tiles depict. Changing the instant rewrites the source's URL template so
//! the host requests every tile again.
//!
//! Lifecycle: `Uninitialized` until the host reports it has loaded,
//! `Mounted` afterwards, and `Unmounted` for good once [`OverlayLayer::unmount`]
//! has run.

mod identity;

pub use identity::InstanceIdentity;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::OverlayError;
use crate::host::{MapHost, RasterLayer, RasterSource, TransitionOptions};
use crate::protocol::{tile_url_template, RasterPool, TileDispatcher};
use crate::raster::{Color, RasterStyle, DEFAULT_TILE_SIZE};
use crate::time::{Clock, Timestamp};

/// Opacity an overlay starts with unless configured otherwise.
pub const DEFAULT_OPACITY: f64 = 0.7;

/// Paint transition installed on a freshly added layer.
pub const DEFAULT_LAYER_TRANSITION: TransitionOptions = TransitionOptions {
    duration: Duration::from_millis(1000),
    delay: Duration::ZERO,
};

/// Configuration for one overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrepusculeOptions {
    pub color: Color,
    pub opacity: f64,
    /// Instant to depict; `None` means "now" at construction.
    pub date: Option<Timestamp>,
    pub debug: bool,
    pub tile_size: u32,
    /// Transition the host layer is created with.
    pub layer_transition: TransitionOptions,
}

impl Default for CrepusculeOptions {
    fn default() -> Self {
        Self {
            color: Color::NIGHT,
            opacity: DEFAULT_OPACITY,
            date: None,
            debug: false,
            tile_size: DEFAULT_TILE_SIZE,
            layer_transition: DEFAULT_LAYER_TRANSITION,
        }
    }
}

impl CrepusculeOptions {
    #[must_use]
    pub fn style(&self) -> RasterStyle {
        RasterStyle {
            color: self.color,
            tile_size: self.tile_size,
            debug: self.debug,
        }
    }
}

/// Where an overlay is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    /// Waiting for the host map to load.
    Uninitialized,
    Mounted,
    /// Terminal; every further call fails.
    Unmounted,
}

#[derive(Debug)]
struct LayerInner {
    state: LayerState,
    opacity: f64,
    hidden: bool,
    date: Timestamp,
}

impl LayerInner {
    fn ensure_usable(&self) -> Result<(), OverlayError> {
        if self.state == LayerState::Unmounted {
            Err(OverlayError::AlreadyUnmounted)
        } else {
            Ok(())
        }
    }

    fn painted_opacity(&self) -> f64 {
        if self.hidden {
            0.0
        } else {
            self.opacity
        }
    }
}

/// State shared with the deferred mount callback.
struct LayerCore {
    identity: InstanceIdentity,
    host: Arc<dyn MapHost>,
    dispatcher: TileDispatcher,
    layer_transition: TransitionOptions,
    inner: Mutex<LayerInner>,
}

impl LayerCore {
    fn lock(&self) -> MutexGuard<'_, LayerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register protocol, source and layer with the host. A no-op unless the
    /// layer is still waiting to mount.
    fn mount(&self) -> Result<(), OverlayError> {
        let mut inner = self.lock();
        if inner.state != LayerState::Uninitialized {
            return Ok(());
        }

        let protocol = self.identity.protocol();
        let source_id = self.identity.source_id();
        let layer_id = self.identity.layer_id();

        self.host
            .add_protocol(protocol, Arc::new(self.dispatcher.clone()))?;

        let source = RasterSource {
            id: source_id.to_string(),
            tiles: tile_url_template(protocol, inner.date),
            tile_size: self.dispatcher.style().tile_size,
        };
        if let Err(e) = self.host.add_raster_source(source) {
            self.host.remove_protocol(protocol);
            return Err(e.into());
        }

        let layer = RasterLayer {
            id: layer_id.to_string(),
            source: source_id.to_string(),
            opacity: inner.painted_opacity(),
            opacity_transition: self.layer_transition,
        };
        if let Err(e) = self.host.add_raster_layer(layer) {
            if let Err(rollback) = self.host.remove_source(source_id) {
                warn!("Failed to remove source {} after layer error: {}", source_id, rollback);
            }
            self.host.remove_protocol(protocol);
            return Err(e.into());
        }

        inner.state = LayerState::Mounted;
        info!("Mounted overlay {} at {}", self.identity.tag(), inner.date);
        Ok(())
    }
}

/// One addressable (source, layer) pair drawing the twilight raster.
pub struct OverlayLayer {
    core: Arc<LayerCore>,
    clock: Arc<dyn Clock>,
    pool: RasterPool,
    owns_pool: bool,
}

impl fmt::Debug for OverlayLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.core.lock();
        f.debug_struct("OverlayLayer")
            .field("identity", &self.core.identity)
            .field("state", &inner.state)
            .field("opacity", &inner.opacity)
            .field("hidden", &inner.hidden)
            .field("date", &inner.date)
            .finish_non_exhaustive()
    }
}

impl OverlayLayer {
    /// Create an overlay rendering on its own worker pool.
    ///
    /// The overlay mounts immediately if the host has loaded, otherwise once
    /// it does.
    pub fn new(
        host: Arc<dyn MapHost>,
        clock: Arc<dyn Clock>,
        options: CrepusculeOptions,
    ) -> Result<Self, OverlayError> {
        Self::build(host, clock, options, RasterPool::default(), true)
    }

    /// Create an overlay rendering on a pool shared with other overlays.
    pub fn with_pool(
        host: Arc<dyn MapHost>,
        clock: Arc<dyn Clock>,
        options: CrepusculeOptions,
        pool: RasterPool,
    ) -> Result<Self, OverlayError> {
        Self::build(host, clock, options, pool, false)
    }

    fn build(
        host: Arc<dyn MapHost>,
        clock: Arc<dyn Clock>,
        options: CrepusculeOptions,
        pool: RasterPool,
        owns_pool: bool,
    ) -> Result<Self, OverlayError> {
        let date = options.date.unwrap_or_else(|| clock.now());
        let core = Arc::new(LayerCore {
            identity: InstanceIdentity::generate(),
            host: Arc::clone(&host),
            dispatcher: TileDispatcher::new(options.style(), pool.clone()),
            layer_transition: options.layer_transition,
            inner: Mutex::new(LayerInner {
                state: LayerState::Uninitialized,
                opacity: options.opacity.clamp(0.0, 1.0),
                hidden: false,
                date,
            }),
        });

        if host.is_loaded() {
            core.mount()?;
        } else {
            debug!("Map not loaded yet, deferring overlay {}", core.identity.tag());
            let pending: Weak<LayerCore> = Arc::downgrade(&core);
            host.on_load(Box::new(move || {
                if let Some(core) = pending.upgrade() {
                    if let Err(e) = core.mount() {
                        error!("Failed to mount overlay {}: {}", core.identity.tag(), e);
                    }
                }
            }));
        }

        Ok(Self {
            core,
            clock,
            pool,
            owns_pool,
        })
    }

    #[must_use]
    pub fn identity(&self) -> &InstanceIdentity {
        &self.core.identity
    }

    #[must_use]
    pub fn state(&self) -> LayerState {
        self.core.lock().state
    }

    /// Opacity last requested through [`set_opacity`](Self::set_opacity).
    #[must_use]
    pub fn opacity(&self) -> f64 {
        self.core.lock().opacity
    }

    /// Opacity the host is asked to paint: zero while hidden.
    #[must_use]
    pub fn painted_opacity(&self) -> f64 {
        self.core.lock().painted_opacity()
    }

    /// Instant the tiles depict.
    #[must_use]
    pub fn date(&self) -> Timestamp {
        self.core.lock().date
    }

    #[must_use]
    pub fn style(&self) -> RasterStyle {
        self.core.dispatcher.style()
    }

    /// Set the layer's opacity, animated by the host over `transition`.
    pub fn set_opacity(
        &self,
        opacity: f64,
        transition: TransitionOptions,
    ) -> Result<(), OverlayError> {
        let mut inner = self.core.lock();
        inner.ensure_usable()?;
        inner.opacity = opacity.clamp(0.0, 1.0);
        inner.hidden = false;
        self.paint(&inner, transition)
    }

    /// Fade to fully transparent.
    ///
    /// Unlike `set_opacity(0.0, ..)` this leaves [`opacity`](Self::opacity)
    /// untouched, so [`show`](Self::show) brings the layer back at the
    /// opacity it had before.
    pub fn hide(&self, transition: TransitionOptions) -> Result<(), OverlayError> {
        let mut inner = self.core.lock();
        inner.ensure_usable()?;
        inner.hidden = true;
        self.paint(&inner, transition)
    }

    /// Fade back to the configured opacity.
    pub fn show(&self, transition: TransitionOptions) -> Result<(), OverlayError> {
        let mut inner = self.core.lock();
        inner.ensure_usable()?;
        inner.hidden = false;
        self.paint(&inner, transition)
    }

    fn paint(&self, inner: &LayerInner, transition: TransitionOptions) -> Result<(), OverlayError> {
        if inner.state == LayerState::Mounted {
            self.core.host.set_raster_opacity(
                self.core.identity.layer_id(),
                inner.painted_opacity(),
                transition,
            )?;
        }
        Ok(())
    }

    /// Depict `date`, making the host request every tile again.
    pub fn set_date(&self, date: Timestamp) -> Result<(), OverlayError> {
        let mut inner = self.core.lock();
        inner.ensure_usable()?;
        inner.date = date;
        if inner.state == LayerState::Mounted {
            let template = tile_url_template(self.core.identity.protocol(), date);
            self.core
                .host
                .set_source_tiles(self.core.identity.source_id(), &template)?;
            debug!("Overlay {} now depicts {}", self.core.identity.tag(), date);
        }
        Ok(())
    }

    /// Depict the current instant.
    pub fn update(&self) -> Result<(), OverlayError> {
        self.set_date(self.clock.now())
    }

    /// Remove the layer, source and protocol from the host. Irreversible.
    pub fn unmount(&self) -> Result<(), OverlayError> {
        let mut inner = self.core.lock();
        inner.ensure_usable()?;
        let was_mounted = inner.state == LayerState::Mounted;
        inner.state = LayerState::Unmounted;
        drop(inner);

        if self.owns_pool {
            self.pool.close();
        }
        if !was_mounted {
            info!("Overlay {} unmounted before the map loaded", self.core.identity.tag());
            return Ok(());
        }

        let host = &self.core.host;
        let identity = &self.core.identity;
        let layer = host.remove_layer(identity.layer_id());
        let source = host.remove_source(identity.source_id());
        host.remove_protocol(identity.protocol());
        info!("Unmounted overlay {}", identity.tag());

        layer.and(source)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::failing::FailingHost;
    use crate::host::HeadlessMap;
    use crate::time::ManualClock;

    const START: i64 = 1_700_000_000_000;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Timestamp::from_millis(START).unwrap()))
    }

    fn options() -> CrepusculeOptions {
        CrepusculeOptions {
            tile_size: 16,
            ..CrepusculeOptions::default()
        }
    }

    fn unmounted(result: Result<(), OverlayError>) -> bool {
        matches!(result, Err(OverlayError::AlreadyUnmounted))
    }

    #[test]
    fn test_mounts_immediately_on_loaded_map() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::loaded(clock.clone(), Vec::new()));
        let layer = OverlayLayer::new(map.clone(), clock, options()).unwrap();
        let id = layer.identity();

        assert_eq!(layer.state(), LayerState::Mounted);
        assert!(map.has_protocol(id.protocol()));
        assert_eq!(map.layer_source(id.layer_id()).as_deref(), Some(id.source_id()));
        assert_eq!(
            map.source_tiles(id.source_id()),
            Some(format!("{}://{{z}}-{{x}}-{{y}}-{START}", id.protocol()))
        );
        assert_eq!(map.opacity(id.layer_id()), Some(DEFAULT_OPACITY));
        assert_eq!(map.layer_transition(id.layer_id()), Some(DEFAULT_LAYER_TRANSITION));
    }

    #[test]
    fn test_defers_mount_until_map_loads() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::new(clock.clone(), Vec::new()));
        let layer = OverlayLayer::new(map.clone(), clock, options()).unwrap();
        assert_eq!(layer.state(), LayerState::Uninitialized);
        assert!(!map.has_layer(layer.identity().layer_id()));

        // Changes before mount are applied when the map loads.
        layer.set_opacity(0.3, TransitionOptions::IMMEDIATE).unwrap();
        map.set_loaded();
        assert_eq!(layer.state(), LayerState::Mounted);
        assert_eq!(map.opacity(layer.identity().layer_id()), Some(0.3));
    }

    #[test]
    fn test_set_date_rewrites_template_and_reloads() {
        let clock = clock();
        let viewport: Vec<_> = crate::tile::TileCoord::all_at_zoom(1).collect();
        let map = Arc::new(HeadlessMap::loaded(clock.clone(), viewport));
        let layer = OverlayLayer::new(map.clone(), clock.clone(), options()).unwrap();
        assert_eq!(map.pending_fetches(), 4);

        clock.advance(Duration::from_secs(5));
        layer.update().unwrap();
        assert_eq!(layer.date().as_millis(), START + 5_000);
        let tiles = map.source_tiles(layer.identity().source_id()).unwrap();
        assert!(tiles.ends_with(&format!("-{}", START + 5_000)));
        assert_eq!(map.pending_fetches(), 4);
    }

    #[test]
    fn test_hide_and_show_keep_configured_opacity() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::loaded(clock.clone(), Vec::new()));
        let layer = OverlayLayer::new(map.clone(), clock, options()).unwrap();
        let layer_id = layer.identity().layer_id().to_string();

        layer.hide(TransitionOptions::IMMEDIATE).unwrap();
        assert_eq!(map.opacity(&layer_id), Some(0.0));
        assert_eq!(layer.painted_opacity(), 0.0);
        assert_eq!(layer.opacity(), DEFAULT_OPACITY);

        layer.show(TransitionOptions::IMMEDIATE).unwrap();
        assert_eq!(map.opacity(&layer_id), Some(DEFAULT_OPACITY));
    }

    #[test]
    fn test_opacity_is_clamped() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::loaded(clock.clone(), Vec::new()));
        let layer = OverlayLayer::new(map, clock, options()).unwrap();
        layer.set_opacity(1.7, TransitionOptions::IMMEDIATE).unwrap();
        assert_eq!(layer.opacity(), 1.0);
        layer.set_opacity(-0.2, TransitionOptions::IMMEDIATE).unwrap();
        assert_eq!(layer.opacity(), 0.0);
    }

    #[test]
    fn test_unmount_is_terminal() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::loaded(clock.clone(), Vec::new()));
        let layer = OverlayLayer::new(map.clone(), clock, options()).unwrap();
        let identity = layer.identity().clone();

        layer.unmount().unwrap();
        assert_eq!(layer.state(), LayerState::Unmounted);
        assert!(!map.has_layer(identity.layer_id()));
        assert!(!map.has_source(identity.source_id()));
        assert!(!map.has_protocol(identity.protocol()));

        let now = Timestamp::from_millis(START).unwrap();
        assert!(unmounted(layer.set_opacity(0.5, TransitionOptions::IMMEDIATE)));
        assert!(unmounted(layer.hide(TransitionOptions::IMMEDIATE)));
        assert!(unmounted(layer.show(TransitionOptions::IMMEDIATE)));
        assert!(unmounted(layer.set_date(now)));
        assert!(unmounted(layer.update()));
        assert!(unmounted(layer.unmount()));
    }

    #[test]
    fn test_unmount_before_load_skips_mount() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::new(clock.clone(), Vec::new()));
        let layer = OverlayLayer::new(map.clone(), clock, options()).unwrap();
        layer.unmount().unwrap();

        map.set_loaded();
        assert_eq!(layer.state(), LayerState::Unmounted);
        assert!(!map.has_layer(layer.identity().layer_id()));
    }

    #[test]
    fn test_failed_mount_rolls_back_source_and_protocol() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::loaded(clock.clone(), Vec::new()));
        let host = Arc::new(FailingHost::new(map.clone()));
        host.reject_layers();

        let layer_id = match OverlayLayer::new(host, clock, options()) {
            Err(OverlayError::Host(HostError::DuplicateLayer(id))) => id,
            other => panic!("expected a rejected layer, got {other:?}"),
        };
        let tag = layer_id.rsplit('_').next().unwrap();
        let id = InstanceIdentity::with_tag(tag);
        assert_eq!(id.layer_id(), layer_id);
        assert!(!map.has_source(id.source_id()));
        assert!(!map.has_protocol(id.protocol()));
        assert!(!map.has_layer(id.layer_id()));
    }

    #[test]
    fn test_set_opacity_zero_then_show_stays_hidden() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::loaded(clock.clone(), Vec::new()));
        let layer = OverlayLayer::new(map.clone(), clock, options()).unwrap();

        layer.set_opacity(0.0, TransitionOptions::IMMEDIATE).unwrap();
        layer.show(TransitionOptions::IMMEDIATE).unwrap();
        assert_eq!(layer.opacity(), 0.0);
        assert_eq!(map.opacity(layer.identity().layer_id()), Some(0.0));
    }

    #[test]
    fn test_overlays_do_not_collide() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::loaded(clock.clone(), Vec::new()));
        let a = OverlayLayer::new(map.clone(), clock.clone(), options()).unwrap();
        let b = OverlayLayer::new(map.clone(), clock, options()).unwrap();
        assert_ne!(a.identity(), b.identity());
        assert!(map.has_layer(a.identity().layer_id()));
        assert!(map.has_layer(b.identity().layer_id()));
    }

    #[test]
    fn test_explicit_date_option() {
        let clock = clock();
        let map = Arc::new(HeadlessMap::loaded(clock.clone(), Vec::new()));
        let date = Timestamp::from_millis(0).unwrap();
        let layer = OverlayLayer::new(
            map,
            clock,
            CrepusculeOptions {
                date: Some(date),
                ..options()
            },
        )
        .unwrap();
        assert_eq!(layer.date(), date);
    }
}
