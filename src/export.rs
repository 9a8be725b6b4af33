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

//! Writing generated tiles to disk.

use std::path::Path;

use sha2::{Digest, Sha256};
use twilight_overlay::RasterBuffer;

/// Save a tile as an RGBA PNG, creating parent directories as needed.
pub fn write_png(path: &Path, buffer: &RasterBuffer) -> Result<(), image::ImageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let size = buffer.tile_size();
    image::save_buffer_with_format(
        path,
        buffer.as_bytes(),
        size,
        size,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
}

/// Hex SHA-256 of the raw pixel bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use twilight_overlay::{generate, Color, TileCoord, Timestamp};

    fn tile() -> RasterBuffer {
        let coord = TileCoord::new(1, 0, 0).unwrap();
        let ts = Timestamp::from_millis(1_700_000_000_000).unwrap();
        generate(coord, ts, Color::NIGHT, 32, false)
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_is_stable_for_same_tile() {
        assert_eq!(sha256_hex(tile().as_bytes()), sha256_hex(tile().as_bytes()));
    }

    #[test]
    fn test_write_png_preserves_pixels() {
        let buffer = tile();
        let dir = std::env::temp_dir().join(format!("crepuscule-export-{}", std::process::id()));
        let path = dir.join("nested").join("tile.png");

        write_png(&path, &buffer).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (32, 32));
        for (px, py) in [(0, 0), (16, 16), (31, 5)] {
            assert_eq!(Some(decoded.get_pixel(px, py).0), buffer.pixel(px, py));
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
