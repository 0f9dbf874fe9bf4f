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

use tokio::sync::broadcast;

/// One-shot close signal observed by pump and accept-loop tasks.
///
/// Each closable component owns a `broadcast::Sender<()>`; closing the
/// component sends once, and every task that must wind down holds a
/// `CloseSignal` built from a subscription. `recv` completes at most once
/// per signal and is a no-op afterwards, so it is safe inside `select!`
/// loops.
#[derive(Debug)]
pub struct CloseSignal {
    observed: bool,
    notify: broadcast::Receiver<()>,
}

impl CloseSignal {
    pub fn new(notify: broadcast::Receiver<()>) -> CloseSignal {
        CloseSignal {
            observed: false,
            notify,
        }
    }

    pub fn observed(&self) -> bool {
        self.observed
    }

    pub async fn recv(&mut self) {
        if self.observed {
            return;
        }
        // a RecvError means the sender side is gone, which counts as closed
        let _ = self.notify.recv().await;
        self.observed = true;
    }
}
