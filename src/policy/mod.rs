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

//! Acceptance policies: the pluggable hook a server runs against every
//! newly accepted connection before promoting it to an active client.
//!
//! Policy internals are application territory; the framework only provides
//! the contract, a bounded wait, and frame pumping on the raw connection
//! while the policy converses with the peer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::network::Connection;
use crate::packet::StockPackets;

/// Verdict of one policy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Success,
    Failure(String),
}

/// What a policy gets to work with: the raw connection (no session exists
/// yet) and the stock packet IDs. A policy that needs to talk to the peer
/// installs its own packet receiver on the connection; the accept path
/// keeps `process()` running for the duration.
pub struct PolicyContext {
    pub connection: Arc<Connection>,
    pub stock: Arc<StockPackets>,
}

/// One policy instance enforces once, for one accepted connection.
pub trait AcceptancePolicy: Send + Sync {
    fn enforce<'a>(
        &'a self,
        ctx: &'a PolicyContext,
    ) -> Pin<Box<dyn Future<Output = PolicyOutcome> + Send + 'a>>;
}

/// Builds a fresh policy per accepted connection.
pub type PolicyFactory = Arc<dyn Fn() -> Box<dyn AcceptancePolicy> + Send + Sync>;

/// Accepts every connection immediately.
pub struct OpenPolicy;

impl AcceptancePolicy for OpenPolicy {
    fn enforce<'a>(
        &'a self,
        _ctx: &'a PolicyContext,
    ) -> Pin<Box<dyn Future<Output = PolicyOutcome> + Send + 'a>> {
        Box::pin(async { PolicyOutcome::Success })
    }
}

pub fn open_policy_factory() -> PolicyFactory {
    Arc::new(|| Box::new(OpenPolicy))
}
