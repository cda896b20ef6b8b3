/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

use std::fmt;

/// Lifecycle of the ingestion daemon.
///
/// `NotRunning → Running → ShuttingDown → Stopped`. A daemon may also stop
/// without ever running. Nothing leaves `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    NotRunning,
    Running,
    ShuttingDown,
    Stopped,
}

impl DaemonState {
    pub fn can_transition_to(&self, next: DaemonState) -> bool {
        use DaemonState::*;
        matches!(
            (*self, next),
            (NotRunning, Running)
                | (NotRunning, ShuttingDown)
                | (Running, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonState::NotRunning => "not_running",
            DaemonState::Running => "running",
            DaemonState::ShuttingDown => "shutting_down",
            DaemonState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
