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

//! Per-instance naming.

use uuid::Uuid;

const PROTOCOL_PREFIX: &str = "crepuscule_protocol";
const SOURCE_PREFIX: &str = "crepuscule_source";
const LAYER_PREFIX: &str = "crepuscule_layer";

/// Length of the random tag shared by one instance's ids.
const TAG_LEN: usize = 12;

/// The ids one overlay instance registers with the host.
///
/// Every id embeds the same random tag, so several overlays can share a map
/// without colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceIdentity {
    tag: String,
    protocol: String,
    source_id: String,
    layer_id: String,
}

impl InstanceIdentity {
    /// Generate an identity with a fresh random tag.
    #[must_use]
    pub fn generate() -> Self {
        let mut tag = Uuid::new_v4().simple().to_string();
        tag.truncate(TAG_LEN);
        Self::with_tag(&tag)
    }

    /// Build an identity from a known tag.
    #[must_use]
    pub fn with_tag(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            protocol: format!("{PROTOCOL_PREFIX}_{tag}"),
            source_id: format!("{SOURCE_PREFIX}_{tag}"),
            layer_id: format!("{LAYER_PREFIX}_{tag}"),
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// URL scheme the instance's tiles are requested through.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    #[must_use]
    pub fn layer_id(&self) -> &str {
        &self.layer_id
    }
}
