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

//! Tile pyramid addressing and Web Mercator projection utilities.

use std::f64::consts::PI;
use std::fmt;

/// Deepest zoom level whose tile indices still fit in a `u32`.
pub const MAX_ZOOM: u8 = 30;

/// Web Mercator projection utilities
#[derive(Debug, Clone, Copy)]
pub struct WebMercator;

impl WebMercator {
    /// Convert latitude to Web Mercator Y coordinate in tile units
    #[must_use]
    pub fn lat_to_y(lat: f64, zoom: u8) -> f64 {
        let lat_rad = lat.to_radians();
        let n = 2_f64.powi(i32::from(zoom));
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;
        y * n
    }

    /// Convert longitude to Web Mercator X coordinate in tile units
    #[must_use]
    pub fn lon_to_x(lon: f64, zoom: u8) -> f64 {
        let n = 2_f64.powi(i32::from(zoom));
        ((lon + 180.0) / 360.0) * n
    }

    /// Convert a (fractional) tile Y coordinate back to latitude
    #[must_use]
    pub fn tile_to_lat(y: f64, zoom: u8) -> f64 {
        let n = 2_f64.powi(i32::from(zoom));
        let lat_rad = (PI * (1.0 - 2.0 * y / n)).sinh().atan();
        lat_rad.to_degrees()
    }

    /// Convert a (fractional) tile X coordinate back to longitude
    #[must_use]
    pub fn tile_to_lon(x: f64, zoom: u8) -> f64 {
        let n = 2_f64.powi(i32::from(zoom));
        x / n * 360.0 - 180.0
    }
}

/// A point on the globe, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// The point on the opposite side of the globe.
    #[must_use]
    pub fn antipode(&self) -> Self {
        let lon = if self.lon > 0.0 { self.lon - 180.0 } else { self.lon + 180.0 };
        Self { lat: -self.lat, lon }
    }

    /// Great-circle angle between two points in degrees (0..=180), using the
    /// haversine formula.
    #[must_use]
    pub fn angular_distance_deg(&self, other: &GeoPoint) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lon = (other.lon - self.lon).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.clamp(0.0, 1.0).sqrt().atan2((1.0 - a).clamp(0.0, 1.0).sqrt());

        c.to_degrees()
    }
}

/// A tile in the power-of-two Web Mercator pyramid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Create a tile coordinate, or `None` when `x`/`y` fall outside the
    /// `2^z` grid or `z` exceeds [`MAX_ZOOM`].
    #[must_use]
    pub fn new(z: u8, x: u32, y: u32) -> Option<Self> {
        if z > MAX_ZOOM {
            return None;
        }
        let n = Self::tiles_per_axis(z);
        (x < n && y < n).then_some(Self { z, x, y })
    }

    /// Number of tiles along one axis at `zoom`.
    #[must_use]
    pub fn tiles_per_axis(zoom: u8) -> u32 {
        1_u32 << zoom.min(MAX_ZOOM)
    }

    /// Every tile of the pyramid at `zoom`, row-major.
    pub fn all_at_zoom(zoom: u8) -> impl Iterator<Item = TileCoord> {
        let zoom = zoom.min(MAX_ZOOM);
        let n = Self::tiles_per_axis(zoom);
        (0..n).flat_map(move |y| (0..n).map(move |x| TileCoord { z: zoom, x, y }))
    }

    /// Geographic position of the centre of pixel `(px, py)` in a tile
    /// rendered at `tile_size` pixels per side.
    #[must_use]
    pub fn pixel_to_geo(&self, px: u32, py: u32, tile_size: u32) -> GeoPoint {
        let size = f64::from(tile_size.max(1));
        let tx = f64::from(self.x) + (f64::from(px) + 0.5) / size;
        let ty = f64::from(self.y) + (f64::from(py) + 0.5) / size;
        GeoPoint {
            lat: WebMercator::tile_to_lat(ty, self.z),
            lon: WebMercator::tile_to_lon(tx, self.z),
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
