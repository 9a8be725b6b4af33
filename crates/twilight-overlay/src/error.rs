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

//! Error types shared by the overlay, dispatcher and scheduler.

use thiserror::Error;

/// Failures reported by a [`MapHost`](crate::host::MapHost) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("source '{0}' already exists")]
    DuplicateSource(String),

    #[error("layer '{0}' already exists")]
    DuplicateLayer(String),

    #[error("protocol '{0}' is already registered")]
    DuplicateProtocol(String),

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("unknown layer '{0}'")]
    UnknownLayer(String),
}

/// Errors surfaced by the overlay core.
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The tile identifier was missing or did not hold four numeric fields.
    #[error("malformed tile request: {0}")]
    MalformedRequest(String),

    /// A mutating call was made after `unmount()`.
    #[error("this overlay was unmounted and can no longer be used")]
    AlreadyUnmounted,

    /// A timer was armed outside of a tokio runtime.
    #[error("no tokio runtime is available to drive the crossfade timer")]
    NoRuntime,

    #[error("map host error: {0}")]
    Host(#[from] HostError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_error_converts() {
        let err: OverlayError = HostError::UnknownLayer("layer_x".to_string()).into();
        assert!(matches!(err, OverlayError::Host(HostError::UnknownLayer(ref id)) if id == "layer_x"));
        assert_eq!(err.to_string(), "map host error: unknown layer 'layer_x'");
    }
}
