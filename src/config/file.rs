//! `groundwork.yaml` configuration file
//!
//! Every field is optional. Values from the file are applied first, so flags
//! given on the command line override them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{BootstrapOptionsBuilder, parse_duration};
use crate::error::{Result, config};

pub const CONFIG_FILE: &str = "groundwork.yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message_appendix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerconfig: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| config::read_failed(path.display().to_string(), e.to_string()))?;
        Self::from_yaml(&content)
            .map_err(|e| config::parse_failed(path.display().to_string(), e.to_string()))
    }

    /// Loads `path` when given, else `./groundwork.yaml` when it exists.
    pub fn discover(path: Option<&Path>) -> Result<Option<Self>> {
        match path {
            Some(path) => Self::load(path).map(Some),
            None => {
                let default = Path::new(CONFIG_FILE);
                if default.is_file() {
                    Self::load(default).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(yaml)?;
        Ok(file)
    }

    /// Copies every value set in the file onto `builder`.
    pub fn apply(self, mut builder: BootstrapOptionsBuilder) -> Result<BootstrapOptionsBuilder> {
        macro_rules! copy {
            ($($field:ident => $setter:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    builder = builder.$setter(value);
                })*
            };
        }
        copy!(
            hostname => hostname,
            owner => owner,
            repository => repository_name,
            description => description,
            branch => default_branch,
            visibility => visibility,
            path => target_path,
            commit_message_appendix => commit_message_appendix,
            components => components,
            registry => registry,
            dockerconfig => docker_config,
            from_file => from_file,
            transport => transport,
            ca_file => ca_file,
            personal => personal,
        );
        if let Some(interval) = self.interval {
            builder = builder.interval(parse_duration(&interval)?);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(parse_duration(&timeout)?);
        }
        Ok(builder)
    }
}
