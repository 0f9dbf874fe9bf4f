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

/// Lifecycle of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// The connection has not started establishing.
    Init,
    /// In the process of establishing a stable connection.
    EstablishingConnection,
    /// Connection failed while establishing.
    FailedToConnect,
    /// The connection is stable and handling I/O.
    Connected,
    /// This client disconnected itself.
    DisconnectedSelf,
    /// The connection ended with a clean end-of-stream from the peer.
    DisconnectedOrderly,
    /// The connection ended abortively (I/O failure, no clean end).
    DisconnectedAbortive,
}

impl ClientState {
    /// Panics on an illegal transition: that is a programming fault of the
    /// caller, not a recoverable runtime condition.
    pub(crate) fn assert_transition(self, next: ClientState) {
        use ClientState::*;
        let legal = matches!(
            (self, next),
            (Init, EstablishingConnection)
                | (EstablishingConnection, FailedToConnect)
                | (EstablishingConnection, Connected)
                | (Connected, DisconnectedSelf)
                | (Connected, DisconnectedOrderly)
                | (Connected, DisconnectedAbortive)
        );
        assert!(
            legal,
            "illegal client state transition {:?} -> {:?}",
            self, next
        );
    }

    pub fn is_disconnected(self) -> bool {
        matches!(
            self,
            ClientState::DisconnectedSelf
                | ClientState::DisconnectedOrderly
                | ClientState::DisconnectedAbortive
        )
    }
}

#[cfg(test)]
mod tests {
    use super::ClientState::*;

    #[test]
    fn legal_lifecycle_transitions() {
        Init.assert_transition(EstablishingConnection);
        EstablishingConnection.assert_transition(FailedToConnect);
        EstablishingConnection.assert_transition(Connected);
        Connected.assert_transition(DisconnectedSelf);
        Connected.assert_transition(DisconnectedOrderly);
        Connected.assert_transition(DisconnectedAbortive);
    }

    #[test]
    #[should_panic(expected = "illegal client state transition")]
    fn init_cannot_jump_straight_to_connected() {
        Init.assert_transition(Connected);
    }

    #[test]
    #[should_panic(expected = "illegal client state transition")]
    fn disconnection_is_final() {
        DisconnectedOrderly.assert_transition(Connected);
    }
}
