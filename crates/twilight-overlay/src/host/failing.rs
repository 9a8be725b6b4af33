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

//! A host wrapper that rejects selected calls, for exercising error paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{HeadlessMap, LoadCallback, MapHost, RasterLayer, RasterSource, TransitionOptions};
use crate::error::HostError;
use crate::protocol::ProtocolHandler;

/// Delegates to a [`HeadlessMap`] except where told to fail.
#[derive(Debug)]
pub struct FailingHost {
    inner: Arc<HeadlessMap>,
    opacity_failures: Mutex<Vec<String>>,
    reject_layers: AtomicBool,
}

impl FailingHost {
    pub fn new(inner: Arc<HeadlessMap>) -> Self {
        Self {
            inner,
            opacity_failures: Mutex::new(Vec::new()),
            reject_layers: AtomicBool::new(false),
        }
    }

    /// Make every opacity change on `layer_id` fail.
    pub fn fail_opacity_for(&self, layer_id: &str) {
        self.opacity_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(layer_id.to_string());
    }

    /// Make `add_raster_layer` fail.
    pub fn reject_layers(&self) {
        self.reject_layers.store(true, Ordering::SeqCst);
    }
}

impl MapHost for FailingHost {
    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    fn on_load(&self, callback: LoadCallback) {
        self.inner.on_load(callback);
    }

    fn add_protocol(
        &self,
        namespace: &str,
        handler: Arc<dyn ProtocolHandler>,
    ) -> Result<(), HostError> {
        self.inner.add_protocol(namespace, handler)
    }

    fn remove_protocol(&self, namespace: &str) {
        self.inner.remove_protocol(namespace);
    }

    fn add_raster_source(&self, source: RasterSource) -> Result<(), HostError> {
        self.inner.add_raster_source(source)
    }

    fn set_source_tiles(&self, source_id: &str, tiles: &str) -> Result<(), HostError> {
        self.inner.set_source_tiles(source_id, tiles)
    }

    fn remove_source(&self, source_id: &str) -> Result<(), HostError> {
        self.inner.remove_source(source_id)
    }

    fn add_raster_layer(&self, layer: RasterLayer) -> Result<(), HostError> {
        if self.reject_layers.load(Ordering::SeqCst) {
            return Err(HostError::DuplicateLayer(layer.id));
        }
        self.inner.add_raster_layer(layer)
    }

    fn set_raster_opacity(
        &self,
        layer_id: &str,
        opacity: f64,
        transition: TransitionOptions,
    ) -> Result<(), HostError> {
        let failing = self
            .opacity_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|id| id == layer_id);
        if failing {
            return Err(HostError::UnknownLayer(layer_id.to_string()));
        }
        self.inner.set_raster_opacity(layer_id, opacity, transition)
    }

    fn remove_layer(&self, layer_id: &str) -> Result<(), HostError> {
        self.inner.remove_layer(layer_id)
    }

    fn trigger_repaint(&self) {
        self.inner.trigger_repaint();
    }
}
