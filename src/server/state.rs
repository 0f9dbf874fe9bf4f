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

/// Lifecycle of a server host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// The server has not started establishing.
    Init,
    /// In the process of establishing a stable host.
    EstablishingHost,
    /// Hosting failed while establishing.
    FailedToHost,
    /// The host is stable and accepting connections.
    Hosting,
    /// The host is no longer open, bound, or accepting connections.
    HostEnded,
}

impl ServerState {
    pub(crate) fn assert_transition(self, next: ServerState) {
        use ServerState::*;
        let legal = matches!(
            (self, next),
            (Init, EstablishingHost)
                | (EstablishingHost, FailedToHost)
                | (EstablishingHost, Hosting)
                | (Hosting, HostEnded)
        );
        assert!(
            legal,
            "illegal server state transition {:?} -> {:?}",
            self, next
        );
    }
}
