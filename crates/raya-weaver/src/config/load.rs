//! TOML loading

use super::{ConfigError, ConfigNode, DumpPatterns, GlobalConfig, MetricsConfig};
use regex::Regex;
use rustc_hash::FxHashMap;
use std::path::Path;

const GLOBAL_SECTION: &str = "global";
const PACKAGES_SECTION: &str = "packages";

impl MetricsConfig {
    /// Load the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            types = config.types.len(),
            packages = config.packages.len(),
            "metrics configuration loaded"
        );
        Ok(config)
    }

    /// Parse a configuration document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content)?;

        let mut global = GlobalConfig::default();
        let mut packages = Vec::new();
        let mut types = FxHashMap::default();

        for (key, value) in table {
            match key.as_str() {
                GLOBAL_SECTION => {
                    global = value.try_into().map_err(|e: toml::de::Error| ConfigError::Shape {
                        section: GLOBAL_SECTION.to_string(),
                        message: e.message().to_string(),
                    })?;
                }
                PACKAGES_SECTION => {
                    let toml::Value::Table(buckets) = value else {
                        return Err(shape(PACKAGES_SECTION, "expected a table of package prefixes"));
                    };
                    for (prefix, bucket) in buckets {
                        if !bucket.is_table() {
                            return Err(shape(
                                &format!("{}.{}", PACKAGES_SECTION, prefix),
                                "expected a table",
                            ));
                        }
                        packages.push((prefix, ConfigNode::from(bucket)));
                    }
                }
                _ => {
                    if !value.is_table() {
                        return Err(shape(&key, "type entries must be tables"));
                    }
                    types.insert(key, ConfigNode::from(value));
                }
            }
        }

        let patterns = DumpPatterns {
            include: compile(&global.dump.include)?,
            exclude: compile(&global.dump.exclude)?,
        };

        Ok(Self {
            global,
            patterns,
            packages,
            types,
        })
    }
}

fn shape(section: &str, message: &str) -> ConfigError {
    ConfigError::Shape {
        section: section.to_string(),
        message: message.to_string(),
    }
}

/// Compile patterns for full-string matching
fn compile(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}
