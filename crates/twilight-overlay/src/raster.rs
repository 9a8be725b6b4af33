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

//! Twilight raster generation.
//!
//! Each pixel of a tile is projected back to latitude/longitude, its angular
//! distance from the sub-solar point is measured, and that distance is turned
//! into an alpha value. Colour is constant across a tile; only alpha varies.

use std::fmt;

use crate::solar::SolarPosition;
use crate::tile::{GeoPoint, TileCoord};
use crate::time::Timestamp;

/// Zenith angle where daylight ends: sun centre 0.833° below the horizon
/// (standard refraction-corrected sunset).
pub const DAY_EDGE_DEG: f64 = 90.833;

/// Zenith angle where astronomical twilight ends.
pub const NIGHT_EDGE_DEG: f64 = 108.0;

/// Alpha painted over full night.
pub const NIGHT_ALPHA: u8 = 255;

/// Tile edge length used by map hosts for this overlay.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Width of the tile outline drawn in debug mode.
const DEBUG_BORDER_PX: u32 = 2;

const BYTES_PER_PIXEL: usize = 4;

/// An 8-bit RGB colour. Alpha is computed per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Near-black night tint.
    pub const NIGHT: Color = Color::new(0, 0, 17);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[must_use]
    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::NIGHT
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

/// How tiles of one overlay are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterStyle {
    pub color: Color,
    pub tile_size: u32,
    pub debug: bool,
}

impl Default for RasterStyle {
    fn default() -> Self {
        Self {
            color: Color::NIGHT,
            tile_size: DEFAULT_TILE_SIZE,
            debug: false,
        }
    }
}

/// Everything needed to render one tile. Cheap to copy onto a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterJob {
    pub coord: TileCoord,
    pub timestamp: Timestamp,
    pub style: RasterStyle,
}

impl RasterJob {
    #[must_use]
    pub fn render(&self) -> RasterBuffer {
        generate(
            self.coord,
            self.timestamp,
            self.style.color,
            self.style.tile_size,
            self.style.debug,
        )
    }
}

/// RGBA pixels for one tile, row-major from the top-left corner.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    tile_size: u32,
    data: Vec<u8>,
}

impl RasterBuffer {
    #[must_use]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// RGBA value of one pixel, or `None` outside the tile.
    #[must_use]
    pub fn pixel(&self, px: u32, py: u32) -> Option<[u8; 4]> {
        if px >= self.tile_size || py >= self.tile_size {
            return None;
        }
        let offset = (py as usize * self.tile_size as usize + px as usize) * BYTES_PER_PIXEL;
        let p = &self.data[offset..offset + BYTES_PER_PIXEL];
        Some([p[0], p[1], p[2], p[3]])
    }
}

impl fmt::Debug for RasterBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterBuffer")
            .field("tile_size", &self.tile_size)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Map a zenith angle (distance from the sub-solar point) to overlay alpha.
///
/// Zero through daylight, a smoothstep through the twilight band, and
/// [`NIGHT_ALPHA`] past astronomical dusk. Non-decreasing in `zenith_deg`.
#[must_use]
pub fn illumination_alpha(zenith_deg: f64) -> u8 {
    let t = ((zenith_deg - DAY_EDGE_DEG) / (NIGHT_EDGE_DEG - DAY_EDGE_DEG)).clamp(0.0, 1.0);
    let eased = t * t * (3.0 - 2.0 * t);
    (eased * f64::from(NIGHT_ALPHA)).round() as u8
}

/// Render the twilight raster for one tile at one instant.
///
/// Identical inputs always produce identical bytes. The output holds
/// `tile_size² × 4` bytes.
#[must_use]
pub fn generate(
    coord: TileCoord,
    timestamp: Timestamp,
    color: Color,
    tile_size: u32,
    debug: bool,
) -> RasterBuffer {
    let sun = SolarPosition::at(timestamp);
    let size = tile_size as usize;
    let mut data = Vec::with_capacity(size * size * BYTES_PER_PIXEL);

    // Latitude only depends on the row and longitude only on the column.
    let columns: Vec<f64> = (0..tile_size)
        .map(|px| coord.pixel_to_geo(px, 0, tile_size).lon)
        .collect();

    for py in 0..tile_size {
        let lat = coord.pixel_to_geo(0, py, tile_size).lat;
        for (px, &lon) in (0_u32..).zip(columns.iter()) {
            let point = GeoPoint::new(lat, lon);
            let alpha = if debug && on_border(px, py, tile_size) {
                u8::MAX
            } else {
                illumination_alpha(sun.zenith_angle_deg(&point))
            };
            data.extend_from_slice(&[color.r, color.g, color.b, alpha]);
        }
    }

    RasterBuffer { tile_size, data }
}

fn on_border(px: u32, py: u32, tile_size: u32) -> bool {
    let far = tile_size.saturating_sub(DEBUG_BORDER_PX);
    px < DEBUG_BORDER_PX || py < DEBUG_BORDER_PX || px >= far || py >= far
}
