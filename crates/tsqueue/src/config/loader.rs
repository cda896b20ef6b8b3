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

use crate::config::{ConfigError, PublisherConfig, Validate};
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "PUBLISHER_CONFIG";

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths
    pub fn new() -> Self {
        let search_paths = vec![
            PathBuf::from("./publisher_config.yaml"),
            PathBuf::from("./publisher_config.yml"),
            // Running from inside the publisher directory.
            PathBuf::from("../publisher_config.yaml"),
            PathBuf::from("../publisher_config.yml"),
        ];

        Self { search_paths }
    }

    /// Create a config loader with custom search paths
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Load and validate configuration from the specified file or auto-discover
    ///
    /// Resolution order: `config_file`, then `PUBLISHER_CONFIG`, then the
    /// search paths.
    pub fn load_config(&self, config_file: Option<&Path>) -> Result<PublisherConfig, ConfigError> {
        let config_path = if let Some(path) = config_file {
            path.to_path_buf()
        } else if let Ok(env_config) = env::var(CONFIG_ENV_VAR) {
            PathBuf::from(env_config)
        } else {
            self.find_config_file()
                .ok_or_else(|| ConfigError::ConfigNotFound {
                    searched: self.search_paths.clone(),
                })?
        };

        let config = self.load_config_from_file(&config_path)?;
        info!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_config_from_file(&self, path: &Path) -> Result<PublisherConfig, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") | None => {}
            Some(ext) => {
                return Err(ConfigError::UnsupportedFormat {
                    extension: ext.to_string(),
                })
            }
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        self.load_config_from_str(&content)
    }

    /// Parse and validate configuration content
    pub fn load_config_from_str(&self, content: &str) -> Result<PublisherConfig, ConfigError> {
        let substituted_content = self.substitute_env_vars(content)?;
        let config: PublisherConfig = serde_yaml::from_str(&substituted_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Find the first existing configuration file in search paths
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .find(|path| path.is_file())
            .cloned()
    }

    /// Substitute environment variables in configuration content
    fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        // ${VAR}, ${VAR:-default}, ${VAR:?error}
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::EnvSubstitutionError(e.to_string()))?;

        let mut result = String::with_capacity(content.len());
        let mut last = 0;
        for cap in re.captures_iter(content) {
            let (Some(full_match), Some(var_expr)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            result.push_str(&content[last..full_match.start()]);
            result.push_str(&self.process_var_expression(var_expr.as_str())?);
            last = full_match.end();
        }
        result.push_str(&content[last..]);

        Ok(result)
    }

    /// Process a variable expression like "VAR", "VAR:-default", or "VAR:?error"
    fn process_var_expression(&self, expr: &str) -> Result<String, ConfigError> {
        if let Some((var_name, default_value)) = expr.split_once(":-") {
            Ok(env::var(var_name).unwrap_or_else(|_| default_value.to_string()))
        } else if let Some((var_name, error_msg)) = expr.split_once(":?") {
            env::var(var_name).map_err(|_| {
                ConfigError::EnvSubstitutionError(format!(
                    "Required environment variable '{}' is not set: {}",
                    var_name, error_msg
                ))
            })
        } else {
            env::var(expr).map_err(|_| {
                ConfigError::EnvSubstitutionError(format!(
                    "Required environment variable '{}' is not set",
                    expr
                ))
            })
        }
    }

    /// Get all search paths for debugging
    pub fn get_search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
