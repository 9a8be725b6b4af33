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

//! Bounded pool for off-thread raster generation.
//!
//! Rendering is CPU bound, so jobs run on tokio's blocking threads while a
//! semaphore caps how many tiles render at once. A burst of tile requests
//! queues on the semaphore instead of spawning unbounded work.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::Semaphore;

use crate::raster::{RasterBuffer, RasterJob};

/// Fallback worker count when CPU detection fails.
pub const FALLBACK_WORKER_COUNT: usize = 4;

/// A cloneable handle to a shared, bounded raster worker pool.
#[derive(Clone)]
pub struct RasterPool {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl fmt::Debug for RasterPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterPool")
            .field("limit", &self.limit)
            .field("available", &self.permits.available_permits())
            .field("closed", &self.permits.is_closed())
            .finish()
    }
}

impl Default for RasterPool {
    fn default() -> Self {
        Self::new(Self::default_limit())
    }
}

impl RasterPool {
    /// Create a pool rendering at most `limit` tiles at once (minimum 1).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// One worker per available CPU.
    #[must_use]
    pub fn default_limit() -> usize {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(FALLBACK_WORKER_COUNT)
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Stop accepting work. Queued and future jobs resolve to `None`.
    pub fn close(&self) {
        self.permits.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Render `job` on a blocking worker once a slot is free.
    ///
    /// Returns `None` when no buffer was produced: the pool was closed or the
    /// worker did not finish. Generation already running cannot be
    /// interrupted.
    pub async fn render(&self, job: RasterJob) -> Option<RasterBuffer> {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            debug!("Raster pool closed, dropping tile {}", job.coord);
            return None;
        };

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job.render()
        });

        match handle.await {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                warn!("Tile generation for {} did not complete: {}", job.coord, e);
                None
            }
        }
    }
}
