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

pub type AppResult<T> = Result<T, AppError>;

/// Recoverable failures of the framework.
///
/// Programming faults (illegal state transitions, re-created sessions) are
/// deliberately not represented here: those are caller contract violations
/// and panic at the offending call site instead of traveling through
/// `AppResult`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    DetailedIo(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    /// wire protocol errors
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// connection lifecycle errors
    #[error("connect error: {0}")]
    Connect(String),

    #[error("accept error: {0}")]
    Accept(String),

    #[error("rejected by peer: {0}")]
    Rejected(String),
}

impl AppError {
    /// Protocol violations are treated like I/O failures at the connection
    /// level (record and close abortively), but tests and diagnostics want
    /// to tell them apart.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            AppError::MalformedFrame(_) | AppError::MalformedPayload(_)
        )
    }
}
