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

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::service::AppError;

/// One captured failure: an optional underlying error, an optional free-form
/// message, and the label of the component that recorded it.
#[derive(Clone, Debug, Default)]
pub struct ErrorEntry {
    pub error: Option<Arc<AppError>>,
    pub message: Option<String>,
    pub origin: Option<&'static str>,
}

impl ErrorEntry {
    pub fn from_error(error: AppError, origin: &'static str) -> ErrorEntry {
        ErrorEntry {
            error: Some(Arc::new(error)),
            message: None,
            origin: Some(origin),
        }
    }

    pub fn from_message(message: impl Into<String>, origin: &'static str) -> ErrorEntry {
        ErrorEntry {
            error: None,
            message: Some(message.into()),
            origin: Some(origin),
        }
    }

    pub fn with_message(
        error: AppError,
        message: impl Into<String>,
        origin: &'static str,
    ) -> ErrorEntry {
        ErrorEntry {
            error: Some(Arc::new(error)),
            message: Some(message.into()),
            origin: Some(origin),
        }
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error[")?;
        if let Some(origin) = self.origin {
            write!(f, "{} ", origin)?;
        }
        match (&self.message, &self.error) {
            (Some(message), Some(error)) => write!(f, "{}: {}", message, error)?,
            (Some(message), None) => write!(f, "{}", message)?,
            (None, Some(error)) => write!(f, "{}", error)?,
            (None, None) => write!(f, "<empty>")?,
        }
        write!(f, "]")
    }
}

struct ChainInner {
    entries: Vec<ErrorEntry>,
    children: Vec<ErrorChain>,
}

/// Composable, traversable record of captured failures.
///
/// Every major object owns one chain; parents graft their children's chains
/// so a single `top_error` query from the outermost object surfaces the
/// deepest original cause. Recording never raises; this is a diagnostics
/// sink, not a control-flow channel.
#[derive(Clone)]
pub struct ErrorChain {
    inner: Arc<Mutex<ChainInner>>,
}

impl ErrorChain {
    pub fn new() -> ErrorChain {
        ErrorChain {
            inner: Arc::new(Mutex::new(ChainInner {
                entries: Vec::new(),
                children: Vec::new(),
            })),
        }
    }

    pub fn record(&self, entry: ErrorEntry) {
        self.inner.lock().entries.push(entry);
    }

    /// Grafts `child` under this chain. Self-grafts are ignored.
    pub fn add_child(&self, child: &ErrorChain) -> &ErrorChain {
        if Arc::ptr_eq(&self.inner, &child.inner) {
            return self;
        }
        self.inner.lock().children.push(child.clone());
        self
    }

    /// Pure pre-order flatten: own entries first, then each child's
    /// flattened entries in attachment order.
    pub fn flatten(&self) -> Vec<ErrorEntry> {
        let inner = self.inner.lock();
        let mut flat = inner.entries.clone();
        for child in &inner.children {
            flat.extend(child.flatten());
        }
        flat
    }

    /// The first entry of the flattened chain, or `None` if nothing has been
    /// recorded anywhere in the tree.
    pub fn top_error(&self) -> Option<ErrorEntry> {
        self.flatten().into_iter().next()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.entries.is_empty() && inner.children.iter().all(|c| c.is_empty())
    }
}

impl Default for ErrorChain {
    fn default() -> Self {
        ErrorChain::new()
    }
}

impl fmt::Debug for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorChain")
            .field("entries", &self.flatten().len())
            .finish()
    }
}
