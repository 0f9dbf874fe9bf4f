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

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use uuid::Uuid;

/// Identifies a session for the life of the process, on both ends of the
/// connection: the server generates it at accept time and sends it to the
/// client, so a client carries the same ID client-side as server-side.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId {
    data: String,
}

impl SessionId {
    /// Wraps an ID received over the wire (client side).
    pub fn adopt(data: impl Into<String>) -> SessionId {
        SessionId { data: data.into() }
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId[{}]", self.data)
    }
}

/// Generator of unique session IDs: 16 random bytes per ID, with
/// process-wide uniqueness enforced against the set already handed out.
///
/// Constructed once at server start and passed in, so isolated servers (and
/// tests) never contaminate each other.
#[derive(Debug, Default)]
pub struct SessionIds {
    generated: Mutex<HashSet<String>>,
}

impl SessionIds {
    pub fn new() -> SessionIds {
        SessionIds {
            generated: Mutex::new(HashSet::new()),
        }
    }

    pub fn next(&self) -> SessionId {
        let mut generated = self.generated.lock();
        loop {
            let data = Uuid::new_v4().simple().to_string();
            if generated.insert(data.clone()) {
                return SessionId { data };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let ids = SessionIds::new();
        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);
        assert_eq!(a.data().len(), 32);
    }

    #[test]
    fn adopted_id_round_trips() {
        let id = SessionId::adopt("abc123");
        assert_eq!(id.data(), "abc123");
        assert_eq!(id, SessionId::adopt("abc123"));
    }
}
