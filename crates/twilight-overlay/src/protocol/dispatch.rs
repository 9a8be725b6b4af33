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

//! Tile request dispatch.

use log::{debug, warn};

use super::{ProtocolHandler, RasterPool, TileFuture, TileRequest, TileResponse};
use crate::error::OverlayError;
use crate::raster::RasterStyle;

/// Serves tile requests for one overlay by rendering them on a
/// [`RasterPool`].
#[derive(Debug, Clone)]
pub struct TileDispatcher {
    style: RasterStyle,
    pool: RasterPool,
}

impl TileDispatcher {
    #[must_use]
    pub fn new(style: RasterStyle, pool: RasterPool) -> Self {
        Self { style, pool }
    }

    #[must_use]
    pub fn style(&self) -> RasterStyle {
        self.style
    }

    /// Parse `url` and render the tile it names.
    ///
    /// Fails with [`OverlayError::MalformedRequest`] on a bad identifier and
    /// returns [`TileResponse::Cancelled`] when the pool produced nothing.
    /// Cancelled tiles are not retried.
    pub async fn dispatch(&self, url: Option<&str>) -> Result<TileResponse, OverlayError> {
        let request = TileRequest::parse(url)?;
        debug!("Dispatching tile {} at {}", request.coord, request.timestamp);

        match self.pool.render(request.job(self.style)).await {
            Some(buffer) => Ok(TileResponse::Data(buffer)),
            None => {
                warn!("No raster produced for {}, cancelling fetch", request.identifier());
                Ok(TileResponse::Cancelled)
            }
        }
    }
}

impl ProtocolHandler for TileDispatcher {
    fn fetch(&self, url: Option<String>) -> TileFuture {
        let dispatcher = self.clone();
        Box::pin(async move { dispatcher.dispatch(url.as_deref()).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{generate, Color};
    use crate::tile::TileCoord;
    use crate::time::Timestamp;

    fn dispatcher() -> TileDispatcher {
        let style = RasterStyle {
            color: Color::new(1, 2, 3),
            tile_size: 64,
            debug: false,
        };
        TileDispatcher::new(style, RasterPool::new(2))
    }

    #[tokio::test]
    async fn test_unparsable_identifier_is_malformed() {
        let result = dispatcher().dispatch(Some("abc")).await;
        assert!(matches!(result, Err(OverlayError::MalformedRequest(_))));

        let result = dispatcher().dispatch(None).await;
        assert!(matches!(result, Err(OverlayError::MalformedRequest(_))));
    }

    #[tokio::test]
    async fn test_valid_identifier_renders_tile() {
        let response = dispatcher().dispatch(Some("2-1-1-1700000000000")).await.unwrap();
        let TileResponse::Data(buffer) = response else {
            panic!("expected tile data, got {response:?}");
        };
        assert_eq!(buffer.len(), 64 * 64 * 4);

        let expected = generate(
            TileCoord::new(2, 1, 1).unwrap(),
            Timestamp::from_millis(1_700_000_000_000).unwrap(),
            Color::new(1, 2, 3),
            64,
            false,
        );
        assert_eq!(buffer, expected);
    }

    #[tokio::test]
    async fn test_closed_pool_cancels() {
        let dispatcher = dispatcher();
        dispatcher.pool.close();
        let response = dispatcher.dispatch(Some("2-1-1-1700000000000")).await.unwrap();
        assert_eq!(response, TileResponse::Cancelled);
    }

    #[tokio::test]
    async fn test_fetch_through_protocol_handler() {
        let handler: Box<dyn ProtocolHandler> = Box::new(dispatcher());
        let url = "crepuscule_protocol_test://0-0-0-1700000000000".to_string();
        let response = handler.fetch(Some(url)).await.unwrap();
        assert!(matches!(response, TileResponse::Data(ref b) if b.tile_size() == 64));
    }
}
