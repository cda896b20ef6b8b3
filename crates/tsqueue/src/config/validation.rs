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

use std::collections::HashSet;

use crate::config::{ConfigValidationError, PublisherConfig, QueueConfig};

pub trait Validate {
    fn validate(&self) -> Result<(), ConfigValidationError>;
}

impl Validate for PublisherConfig {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        let mut errors = Vec::new();

        if self.queues.is_empty() {
            errors.push(ConfigValidationError::NoQueues);
        }

        let mut seen = HashSet::new();
        for (index, queue) in self.queues.iter().enumerate() {
            if queue.name.trim().is_empty() {
                errors.push(ConfigValidationError::EmptyQueueName { index });
                continue;
            }
            if !seen.insert(queue.name.as_str()) {
                errors.push(ConfigValidationError::DuplicateQueue {
                    name: queue.name.clone(),
                });
            }
            if let Err(e) = queue.validate() {
                errors.push(e);
            }
        }

        if self.drain_timeout_secs == 0 {
            errors.push(ConfigValidationError::InvalidDrainTimeout {
                value: self.drain_timeout_secs,
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigValidationError::Multiple { errors }),
        }
    }
}

impl Validate for QueueConfig {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.table.trim().is_empty() {
            return Err(ConfigValidationError::EmptyTable {
                queue: self.name.clone(),
            });
        }

        if !(self.poll_interval.is_finite() && self.poll_interval > 0.0) {
            return Err(ConfigValidationError::InvalidPollInterval {
                queue: self.name.clone(),
                value: self.poll_interval,
            });
        }

        Ok(())
    }
}
