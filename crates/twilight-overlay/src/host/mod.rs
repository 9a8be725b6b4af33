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

//! Interface to the host map library.
//!
//! The overlay does not own the map. It registers a tile protocol, one
//! raster source and one raster layer through [`MapHost`], and addresses
//! them by id afterwards. [`HeadlessMap`] is an in-memory host used by the
//! command-line runner and the tests.

#[cfg(test)]
pub(crate) mod failing;
mod headless;

pub use headless::{FetchedTile, HeadlessMap};

use std::sync::Arc;
use std::time::Duration;

use crate::error::HostError;
use crate::protocol::ProtocolHandler;

/// Callback fired once when the host map finishes loading.
pub type LoadCallback = Box<dyn FnOnce() + Send>;

/// Paint transition forwarded verbatim to the host's paint pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionOptions {
    /// How long the change animates.
    pub duration: Duration,
    /// How long before the change starts.
    pub delay: Duration,
}

impl TransitionOptions {
    /// A change that lands instantly.
    pub const IMMEDIATE: TransitionOptions = TransitionOptions {
        duration: Duration::ZERO,
        delay: Duration::ZERO,
    };

    #[must_use]
    pub fn new(duration: Duration, delay: Duration) -> Self {
        Self { duration, delay }
    }
}

/// A raster tile source backed by a URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSource {
    pub id: String,
    /// URL template with `{z}`, `{x}` and `{y}` placeholders.
    pub tiles: String,
    pub tile_size: u32,
}

/// A raster paint layer drawing one source.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub id: String,
    pub source: String,
    pub opacity: f64,
    /// Transition the layer is created with. Each opacity change installs
    /// its own transition in its place.
    pub opacity_transition: TransitionOptions,
}

/// Calls the overlay makes into the host map library.
pub trait MapHost: Send + Sync {
    /// Whether the map has finished loading.
    fn is_loaded(&self) -> bool;

    /// Run `callback` once the map has loaded.
    fn on_load(&self, callback: LoadCallback);

    /// Route every URL with scheme `namespace` to `handler`.
    fn add_protocol(
        &self,
        namespace: &str,
        handler: Arc<dyn ProtocolHandler>,
    ) -> Result<(), HostError>;

    fn remove_protocol(&self, namespace: &str);

    fn add_raster_source(&self, source: RasterSource) -> Result<(), HostError>;

    /// Replace a source's URL template and reload its tiles.
    fn set_source_tiles(&self, source_id: &str, tiles: &str) -> Result<(), HostError>;

    fn remove_source(&self, source_id: &str) -> Result<(), HostError>;

    fn add_raster_layer(&self, layer: RasterLayer) -> Result<(), HostError>;

    /// Change a layer's opacity, animated by the host over `transition`.
    fn set_raster_opacity(
        &self,
        layer_id: &str,
        opacity: f64,
        transition: TransitionOptions,
    ) -> Result<(), HostError>;

    fn remove_layer(&self, layer_id: &str) -> Result<(), HostError>;

    /// Ask the host to redraw even if nothing else requested a frame.
    fn trigger_repaint(&self);
}
