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

//! Tile protocol layer.
//!
//! Map hosts fetch overlay tiles through a custom URL scheme. The final path
//! segment of each URL is a request identifier of the form
//! `{z}-{x}-{y}-{timestamp}`; this module parses it, renders the tile on a
//! bounded worker pool and hands the pixels back to the host.

mod dispatch;
mod pool;

pub use dispatch::TileDispatcher;
pub use pool::RasterPool;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use crate::error::OverlayError;
use crate::raster::{RasterBuffer, RasterJob, RasterStyle};
use crate::tile::TileCoord;
use crate::time::Timestamp;

/// Result of a tile fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileResponse {
    /// Rendered RGBA pixels.
    Data(RasterBuffer),
    /// No pixels were produced; the host should treat the fetch as aborted
    /// rather than failed.
    Cancelled,
}

/// Future returned to the host for one tile fetch.
pub type TileFuture = Pin<Box<dyn Future<Output = Result<TileResponse, OverlayError>> + Send>>;

/// Handler the host invokes for every URL of a registered protocol.
pub trait ProtocolHandler: Send + Sync {
    /// Serve the tile addressed by `url`. A `None` url is a malformed request.
    fn fetch(&self, url: Option<String>) -> TileFuture;
}

/// A parsed tile request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRequest {
    pub coord: TileCoord,
    pub timestamp: Timestamp,
}

impl TileRequest {
    /// Parse the request identifier carried by the final `/` segment of
    /// `url`.
    pub fn parse(url: Option<&str>) -> Result<Self, OverlayError> {
        let url = url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| OverlayError::MalformedRequest("missing tile url".to_string()))?;
        let id = url.rsplit('/').next().unwrap_or(url);

        // The timestamp is last so a leading '-' on it survives the split.
        let mut fields = id.splitn(4, '-');
        let z = parse_field::<u8>(fields.next(), "z", id)?;
        let x = parse_field::<u32>(fields.next(), "x", id)?;
        let y = parse_field::<u32>(fields.next(), "y", id)?;
        let millis = parse_field::<i64>(fields.next(), "timestamp", id)?;

        let coord = TileCoord::new(z, x, y).ok_or_else(|| {
            OverlayError::MalformedRequest(format!("tile {z}/{x}/{y} is outside the zoom {z} grid"))
        })?;
        let timestamp = Timestamp::from_millis(millis).ok_or_else(|| {
            OverlayError::MalformedRequest(format!("timestamp {millis} is out of range"))
        })?;

        Ok(Self { coord, timestamp })
    }

    /// The identifier form of this request, `{z}-{x}-{y}-{timestamp}`.
    #[must_use]
    pub fn identifier(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.coord.z,
            self.coord.x,
            self.coord.y,
            self.timestamp.as_millis()
        )
    }

    #[must_use]
    pub fn job(&self, style: RasterStyle) -> RasterJob {
        RasterJob {
            coord: self.coord,
            timestamp: self.timestamp,
            style,
        }
    }
}

fn parse_field<T>(field: Option<&str>, name: &'static str, id: &str) -> Result<T, OverlayError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = field
        .ok_or_else(|| OverlayError::MalformedRequest(format!("'{id}' is missing field '{name}'")))?;
    raw.parse().map_err(|err| {
        OverlayError::MalformedRequest(format!("invalid value for field '{name}' in '{id}': {err}"))
    })
}

/// Tile URL template for `namespace` pinned to `timestamp`, with the
/// `{z}`, `{x}` and `{y}` placeholders left for the host to fill in.
#[must_use]
pub fn tile_url_template(namespace: &str, timestamp: Timestamp) -> String {
    format!("{namespace}://{{z}}-{{x}}-{{y}}-{}", timestamp.as_millis())
}

/// Fill the tile placeholders of a URL template.
#[must_use]
pub fn expand_template(template: &str, coord: TileCoord) -> String {
    template
        .replace("{z}", &coord.z.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &coord.y.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed(url: Option<&str>) -> bool {
        matches!(TileRequest::parse(url), Err(OverlayError::MalformedRequest(_)))
    }

    #[test]
    fn test_parse_identifier() {
        let request = TileRequest::parse(Some("2-1-3-1700000000000")).unwrap();
        assert_eq!(request.coord, TileCoord::new(2, 1, 3).unwrap());
        assert_eq!(request.timestamp.as_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_uses_last_path_segment() {
        let url = "crepuscule_protocol_abc://tiles/5-10-12-1700000000000";
        let request = TileRequest::parse(Some(url)).unwrap();
        assert_eq!(request.coord, TileCoord::new(5, 10, 12).unwrap());
        assert_eq!(request.identifier(), "5-10-12-1700000000000");
    }

    #[test]
    fn test_parse_negative_timestamp() {
        let request = TileRequest::parse(Some("0-0-0--1000")).unwrap();
        assert_eq!(request.timestamp.as_millis(), -1000);
    }

    #[test]
    fn test_malformed_requests() {
        assert!(malformed(None));
        assert!(malformed(Some("")));
        assert!(malformed(Some("abc")));
        assert!(malformed(Some("1-2-3")));
        assert!(malformed(Some("1-a-0-1700000000000")));
        assert!(malformed(Some("1-0-0-NaN")));
        assert!(malformed(Some("1-0-0-1.5")));
        assert!(malformed(Some("1-2-0-1700000000000")));
        assert!(malformed(Some("31-0-0-1700000000000")));
        assert!(malformed(Some("0-0-0-9223372036854775807")));
    }

    #[test]
    fn test_template_round_trip() {
        let ts = Timestamp::from_millis(1_700_000_000_000).unwrap();
        let template = tile_url_template("crepuscule_protocol_x", ts);
        assert_eq!(template, "crepuscule_protocol_x://{z}-{x}-{y}-1700000000000");

        let url = expand_template(&template, TileCoord::new(3, 4, 5).unwrap());
        assert_eq!(url, "crepuscule_protocol_x://3-4-5-1700000000000");

        let request = TileRequest::parse(Some(&url)).unwrap();
        assert_eq!(request.coord, TileCoord::new(3, 4, 5).unwrap());
        assert_eq!(request.timestamp, ts);
    }
}
