// Copyright 2025 The Framelink Authors
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

use std::sync::atomic::{AtomicU32, Ordering};

use super::PacketId;

/// Monotonic packet-ID allocator.
///
/// Constructed once at process start and passed to whatever registers
/// packet types; two types never share an ID within one registry. Tests may
/// build as many isolated registries as they like.
#[derive(Debug, Default)]
pub struct PacketIds {
    next: AtomicU32,
}

impl PacketIds {
    pub fn new() -> PacketIds {
        PacketIds {
            next: AtomicU32::new(0),
        }
    }

    pub fn allocate(&self) -> PacketId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        assert!(
            id <= PacketId::MAX as u32,
            "packet id space exhausted ({} allocations)",
            id
        );
        id as PacketId
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_unique() {
        let ids = PacketIds::new();
        assert_eq!(ids.allocate(), 0);
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
    }

    #[test]
    fn registries_are_isolated() {
        let a = PacketIds::new();
        let b = PacketIds::new();
        a.allocate();
        a.allocate();
        assert_eq!(b.allocate(), 0);
    }
}
