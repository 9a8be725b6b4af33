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

//! Headless run of the crossfade loop.
//!
//! Mounts a [`CrossfadeScheduler`] on a [`HeadlessMap`] covering a whole zoom
//! level and serves the tiles the map requests after every swap.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use twilight_overlay::host::FetchedTile;
use twilight_overlay::scheduler::LayerSlot;
use twilight_overlay::{
    Clock, CrepusculeOptions, CrossfadeConfig, CrossfadeScheduler, HeadlessMap, SystemClock,
    TileCoord, TileResponse,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counts for one batch of served tiles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub rendered: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_fetches(fetched: &[FetchedTile]) -> Self {
        let mut summary = Self::default();
        for tile in fetched {
            match &tile.result {
                Ok(TileResponse::Data(_)) => summary.rendered += 1,
                Ok(TileResponse::Cancelled) => summary.cancelled += 1,
                Err(e) => {
                    warn!("Tile {} failed: {}", tile.url, e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

/// Run the loop until `ticks` swaps have been served or Ctrl-C is pressed.
pub async fn run(
    zoom: u8,
    ticks: u32,
    options: CrepusculeOptions,
    crossfade: CrossfadeConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let viewport: Vec<TileCoord> = TileCoord::all_at_zoom(zoom).collect();
    info!(
        "Live overlay on {} tiles at zoom {}, swapping every {:?}",
        viewport.len(),
        zoom,
        crossfade.tick_interval
    );

    let map = Arc::new(HeadlessMap::new(Arc::clone(&clock), viewport));
    let scheduler = CrossfadeScheduler::new(map.clone(), clock, options, crossfade)?;
    scheduler.start_when_loaded()?;
    map.set_loaded();

    let initial = BatchSummary::from_fetches(&map.fetch_pending().await);
    info!("Initial load: {} tiles rendered", initial.rendered);

    let mut served = 0;
    let mut repaints = map.repaint_count();
    while served < ticks {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let current = map.repaint_count();
        if current == repaints {
            continue;
        }
        repaints = current;
        served += 1;

        let summary = BatchSummary::from_fetches(&map.fetch_pending().await);
        let live = if scheduler.live_is_a() { LayerSlot::A } else { LayerSlot::B };
        info!(
            "Swap {}: layer {:?} at {}, {} rendered, {} cancelled, {} failed",
            served,
            live,
            scheduler.layer(live).date().as_datetime().format("%H:%M:%S"),
            summary.rendered,
            summary.cancelled,
            summary.failed
        );
    }

    scheduler.unmount()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use twilight_overlay::{generate, Color, OverlayError, Timestamp};

    fn fetched(result: Result<TileResponse, OverlayError>) -> FetchedTile {
        FetchedTile {
            source_id: "source".to_string(),
            url: "proto://0-0-0-0".to_string(),
            result,
        }
    }

    #[test]
    fn test_batch_summary_counts_outcomes() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let ts = Timestamp::from_millis(0).unwrap();
        let data = generate(coord, ts, Color::NIGHT, 4, false);

        let summary = BatchSummary::from_fetches(&[
            fetched(Ok(TileResponse::Data(data.clone()))),
            fetched(Ok(TileResponse::Data(data))),
            fetched(Ok(TileResponse::Cancelled)),
            fetched(Err(OverlayError::MalformedRequest("x".to_string()))),
        ]);
        assert_eq!(
            summary,
            BatchSummary {
                rendered: 2,
                cancelled: 1,
                failed: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_serves_requested_swaps() {
        let options = CrepusculeOptions {
            tile_size: 8,
            ..CrepusculeOptions::default()
        };
        let crossfade = CrossfadeConfig {
            tick_interval: Duration::from_millis(500),
            grace_delay: Duration::ZERO,
            fade_duration: Duration::ZERO,
            max_concurrent_tiles: 2,
        };
        run(0, 2, options, crossfade).await.unwrap();
    }
}
