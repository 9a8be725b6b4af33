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

//! In-memory map host.
//!
//! Tracks protocols, sources and layers the way a real map library would,
//! evaluates opacity transitions against an injected clock, and queues a
//! tile fetch for every viewport tile whenever a source's template changes.
//! Queued fetches run when [`HeadlessMap::fetch_pending`] is awaited.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use tokio::task::JoinSet;

use super::{LoadCallback, MapHost, RasterLayer, RasterSource, TransitionOptions};
use crate::error::{HostError, OverlayError};
use crate::protocol::{expand_template, ProtocolHandler, TileResponse};
use crate::tile::TileCoord;
use crate::time::{Clock, Timestamp};

/// Outcome of one tile fetch served by a registered protocol.
#[derive(Debug)]
pub struct FetchedTile {
    pub source_id: String,
    pub url: String,
    pub result: Result<TileResponse, OverlayError>,
}

/// Opacity of one layer, possibly mid-transition.
#[derive(Debug, Clone)]
struct LayerPaint {
    source: String,
    from: f64,
    to: f64,
    starts_at: i64,
    ends_at: i64,
    /// Paint transition currently installed on the layer.
    transition: TransitionOptions,
}

impl LayerPaint {
    fn opacity_at(&self, millis: i64) -> f64 {
        if millis < self.starts_at {
            self.from
        } else if millis >= self.ends_at {
            self.to
        } else {
            let t = (millis - self.starts_at) as f64 / (self.ends_at - self.starts_at) as f64;
            self.from + (self.to - self.from) * t
        }
    }
}

#[derive(Default)]
struct HeadlessState {
    loaded: bool,
    load_callbacks: Vec<LoadCallback>,
    protocols: HashMap<String, Arc<dyn ProtocolHandler>>,
    sources: HashMap<String, RasterSource>,
    layers: HashMap<String, LayerPaint>,
    pending: Vec<(String, String)>,
    repaints: u64,
}

/// A map host with no rendering surface.
pub struct HeadlessMap {
    clock: Arc<dyn Clock>,
    viewport: Vec<TileCoord>,
    state: Mutex<HeadlessState>,
}

impl fmt::Debug for HeadlessMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("HeadlessMap")
            .field("viewport_tiles", &self.viewport.len())
            .field("loaded", &state.loaded)
            .field("sources", &state.sources.len())
            .field("layers", &state.layers.len())
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

impl HeadlessMap {
    /// Create an unloaded map showing `viewport`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, viewport: Vec<TileCoord>) -> Self {
        Self {
            clock,
            viewport,
            state: Mutex::new(HeadlessState::default()),
        }
    }

    /// Create a map that reports itself loaded from the start.
    #[must_use]
    pub fn loaded(clock: Arc<dyn Clock>, viewport: Vec<TileCoord>) -> Self {
        let map = Self::new(clock, viewport);
        map.lock().loaded = true;
        map
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Finish loading and fire the registered load callbacks.
    pub fn set_loaded(&self) {
        let callbacks = {
            let mut state = self.lock();
            if state.loaded {
                return;
            }
            state.loaded = true;
            std::mem::take(&mut state.load_callbacks)
        };
        info!("Map loaded, running {} load callbacks", callbacks.len());
        for callback in callbacks {
            callback();
        }
    }

    /// Opacity the layer shows at `at`, or `None` if it does not exist.
    #[must_use]
    pub fn opacity_at(&self, layer_id: &str, at: Timestamp) -> Option<f64> {
        self.lock()
            .layers
            .get(layer_id)
            .map(|paint| paint.opacity_at(at.as_millis()))
    }

    /// Opacity the layer shows right now.
    #[must_use]
    pub fn opacity(&self, layer_id: &str) -> Option<f64> {
        self.opacity_at(layer_id, self.clock.now())
    }

    #[must_use]
    pub fn has_protocol(&self, namespace: &str) -> bool {
        self.lock().protocols.contains_key(namespace)
    }

    #[must_use]
    pub fn has_source(&self, source_id: &str) -> bool {
        self.lock().sources.contains_key(source_id)
    }

    #[must_use]
    pub fn has_layer(&self, layer_id: &str) -> bool {
        self.lock().layers.contains_key(layer_id)
    }

    /// Opacity transition currently installed on the layer.
    #[must_use]
    pub fn layer_transition(&self, layer_id: &str) -> Option<TransitionOptions> {
        self.lock().layers.get(layer_id).map(|paint| paint.transition)
    }

    /// Source the layer draws from.
    #[must_use]
    pub fn layer_source(&self, layer_id: &str) -> Option<String> {
        self.lock().layers.get(layer_id).map(|paint| paint.source.clone())
    }

    /// Current URL template of a source.
    #[must_use]
    pub fn source_tiles(&self, source_id: &str) -> Option<String> {
        self.lock().sources.get(source_id).map(|s| s.tiles.clone())
    }

    #[must_use]
    pub fn repaint_count(&self) -> u64 {
        self.lock().repaints
    }

    /// Number of tile fetches waiting to run.
    #[must_use]
    pub fn pending_fetches(&self) -> usize {
        self.lock().pending.len()
    }

    /// Run every queued tile fetch through its protocol handler.
    pub async fn fetch_pending(&self) -> Vec<FetchedTile> {
        let mut tasks = JoinSet::new();
        {
            let mut state = self.lock();
            let pending = std::mem::take(&mut state.pending);
            for (source_id, url) in pending {
                let scheme = url.split("://").next().unwrap_or_default();
                let Some(handler) = state.protocols.get(scheme) else {
                    warn!("No protocol registered for {}", url);
                    continue;
                };
                let fetch = handler.fetch(Some(url.clone()));
                tasks.spawn(async move {
                    let result = fetch.await;
                    FetchedTile {
                        source_id,
                        url,
                        result,
                    }
                });
            }
        }

        let mut fetched = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(tile) => fetched.push(tile),
                Err(e) => warn!("Tile fetch task failed: {}", e),
            }
        }
        debug!("Served {} tile fetches", fetched.len());
        fetched
    }

    fn queue_viewport(&self, state: &mut HeadlessState, source_id: &str, tiles: &str) {
        state.pending.retain(|(id, _)| id != source_id);
        for coord in &self.viewport {
            state
                .pending
                .push((source_id.to_string(), expand_template(tiles, *coord)));
        }
    }
}

impl MapHost for HeadlessMap {
    fn is_loaded(&self) -> bool {
        self.lock().loaded
    }

    fn on_load(&self, callback: LoadCallback) {
        let mut state = self.lock();
        if state.loaded {
            drop(state);
            callback();
        } else {
            state.load_callbacks.push(callback);
        }
    }

    fn add_protocol(
        &self,
        namespace: &str,
        handler: Arc<dyn ProtocolHandler>,
    ) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.protocols.contains_key(namespace) {
            return Err(HostError::DuplicateProtocol(namespace.to_string()));
        }
        state.protocols.insert(namespace.to_string(), handler);
        Ok(())
    }

    fn remove_protocol(&self, namespace: &str) {
        self.lock().protocols.remove(namespace);
    }

    fn add_raster_source(&self, source: RasterSource) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.sources.contains_key(&source.id) {
            return Err(HostError::DuplicateSource(source.id));
        }
        self.queue_viewport(&mut state, &source.id, &source.tiles);
        state.sources.insert(source.id.clone(), source);
        Ok(())
    }

    fn set_source_tiles(&self, source_id: &str, tiles: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        let source = state
            .sources
            .get_mut(source_id)
            .ok_or_else(|| HostError::UnknownSource(source_id.to_string()))?;
        source.tiles = tiles.to_string();
        self.queue_viewport(&mut state, source_id, tiles);
        Ok(())
    }

    fn remove_source(&self, source_id: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.sources.remove(source_id).is_none() {
            return Err(HostError::UnknownSource(source_id.to_string()));
        }
        state.pending.retain(|(id, _)| id != source_id);
        Ok(())
    }

    fn add_raster_layer(&self, layer: RasterLayer) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.layers.contains_key(&layer.id) {
            return Err(HostError::DuplicateLayer(layer.id));
        }
        if !state.sources.contains_key(&layer.source) {
            return Err(HostError::UnknownSource(layer.source));
        }
        let now = self.clock.now().as_millis();
        state.layers.insert(
            layer.id,
            LayerPaint {
                source: layer.source,
                from: layer.opacity,
                to: layer.opacity,
                starts_at: now,
                ends_at: now,
                transition: layer.opacity_transition,
            },
        );
        Ok(())
    }

    fn set_raster_opacity(
        &self,
        layer_id: &str,
        opacity: f64,
        transition: TransitionOptions,
    ) -> Result<(), HostError> {
        let now = self.clock.now().as_millis();
        let mut state = self.lock();
        let paint = state
            .layers
            .get_mut(layer_id)
            .ok_or_else(|| HostError::UnknownLayer(layer_id.to_string()))?;

        let delay = i64::try_from(transition.delay.as_millis()).unwrap_or(i64::MAX);
        let duration = i64::try_from(transition.duration.as_millis()).unwrap_or(i64::MAX);
        paint.from = paint.opacity_at(now);
        paint.to = opacity;
        paint.starts_at = now.saturating_add(delay);
        paint.ends_at = paint.starts_at.saturating_add(duration);
        paint.transition = transition;
        Ok(())
    }

    fn remove_layer(&self, layer_id: &str) -> Result<(), HostError> {
        self.lock()
            .layers
            .remove(layer_id)
            .map(|_| ())
            .ok_or_else(|| HostError::UnknownLayer(layer_id.to_string()))
    }

    fn trigger_repaint(&self) {
        self.lock().repaints += 1;
    }
}
