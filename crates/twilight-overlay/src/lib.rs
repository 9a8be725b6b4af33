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

//! Twilight overlay for slippy maps.
//!
//! Renders the day/night terminator as RGBA raster tiles and serves them to a
//! host map through a custom URL scheme:
//!
//! - [`solar`] locates the sub-solar point for an instant.
//! - [`raster`] turns a tile and an instant into pixels whose alpha follows
//!   the sun's zenith angle through civil, nautical and astronomical twilight.
//! - [`protocol`] parses tile request identifiers and renders on a bounded
//!   worker pool.
//! - [`overlay`] binds one protocol, source and layer to a [`host::MapHost`].
//! - [`scheduler`] double-buffers two overlays and crossfades them so the
//!   terminator moves without flashing.

pub mod error;
pub mod host;
pub mod overlay;
pub mod protocol;
pub mod raster;
pub mod scheduler;
pub mod solar;
pub mod tile;
pub mod time;

pub use error::{HostError, OverlayError};
pub use host::{HeadlessMap, MapHost, TransitionOptions};
pub use overlay::{CrepusculeOptions, LayerState, OverlayLayer};
pub use protocol::{RasterPool, TileDispatcher, TileRequest, TileResponse};
pub use raster::{generate, Color, RasterBuffer};
pub use scheduler::{CrossfadeConfig, CrossfadeScheduler, LayerSlot, TickOutcome};
pub use solar::SolarPosition;
pub use tile::{GeoPoint, TileCoord};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
