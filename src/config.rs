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

//! Application configuration management.
//!
//! Settings persist as TOML through `confy`. Every field has a serde default,
//! so files written by older versions keep loading as fields are added.
//! Command-line flags override these values per run.

use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use twilight_overlay::raster::DEFAULT_TILE_SIZE;
use twilight_overlay::{Color, CrepusculeOptions, CrossfadeConfig, RasterPool};

const APP_NAME: &str = "crepuscule";
const CONFIG_NAME: &str = "config";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Night tint as `[r, g, b]`
    #[serde(default = "default_color")]
    pub color: [u8; 3],

    /// Overlay opacity (0.0 - 1.0)
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Draw tile borders and tint the two live buffers differently
    #[serde(default)]
    pub debug: bool,

    /// Tile edge length in pixels
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,

    /// Time between live crossfades
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Time a refreshed buffer gets to load before it is revealed
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,

    /// Length of the opacity swap
    #[serde(default)]
    pub fade_duration_ms: u64,

    /// Tiles rendered at once; unset means one per CPU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_tiles: Option<usize>,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_color() -> [u8; 3] {
    Color::NIGHT.to_array()
}

fn default_opacity() -> f64 {
    twilight_overlay::overlay::DEFAULT_OPACITY
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

fn default_tick_interval_ms() -> u64 {
    5_000
}

fn default_grace_delay_ms() -> u64 {
    1_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            color: default_color(),
            opacity: default_opacity(),
            debug: false,
            tile_size: default_tile_size(),
            tick_interval_ms: default_tick_interval_ms(),
            grace_delay_ms: default_grace_delay_ms(),
            fade_duration_ms: 0,
            max_concurrent_tiles: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, replacing out-of-range values with defaults
    pub fn load() -> Result<Self, confy::ConfyError> {
        let config: AppConfig = confy::load(APP_NAME, CONFIG_NAME)?;
        Ok(config.sanitized())
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    fn sanitized(mut self) -> Self {
        if self.opacity.is_nan() {
            warn!("Opacity is not a number, using default");
            self.opacity = default_opacity();
        } else if !(0.0..=1.0).contains(&self.opacity) {
            warn!("Opacity {} out of range, clamping", self.opacity);
            self.opacity = self.opacity.clamp(0.0, 1.0);
        }
        if self.tile_size == 0 {
            warn!("Tile size 0 is invalid, using {}", DEFAULT_TILE_SIZE);
            self.tile_size = DEFAULT_TILE_SIZE;
        }
        if self.tick_interval_ms == 0 {
            warn!("Tick interval 0 is invalid, using default");
            self.tick_interval_ms = default_tick_interval_ms();
        }
        if self.max_concurrent_tiles == Some(0) {
            self.max_concurrent_tiles = None;
        }
        self
    }

    /// Options for a single overlay.
    pub fn overlay_options(&self) -> CrepusculeOptions {
        CrepusculeOptions {
            color: Color::from(self.color),
            opacity: self.opacity,
            debug: self.debug,
            tile_size: self.tile_size,
            ..CrepusculeOptions::default()
        }
    }

    /// Timing of the live crossfade loop.
    pub fn crossfade(&self) -> CrossfadeConfig {
        CrossfadeConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            grace_delay: Duration::from_millis(self.grace_delay_ms),
            fade_duration: Duration::from_millis(self.fade_duration_ms),
            max_concurrent_tiles: self
                .max_concurrent_tiles
                .unwrap_or_else(RasterPool::default_limit),
        }
    }
}
