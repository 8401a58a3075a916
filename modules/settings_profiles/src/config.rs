//! Configuration for the settings container

use serde::Deserialize;

/// Settings container configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsConfig {
    /// Name of the top-level mapping holding the settings in a file
    #[serde(default = "default_root_key")]
    pub root_key: String,

    /// YAML tag written on the settings document (`None` writes no tag)
    #[serde(default = "default_document_tag")]
    pub document_tag: Option<String>,

    /// Watch the backing file of every loaded profile
    #[serde(default)]
    pub monitor_file_modification: bool,

    /// Delete the previous backing file when a profile is saved elsewhere
    #[serde(default = "default_true")]
    pub delete_previous_file_on_move: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            root_key: default_root_key(),
            document_tag: default_document_tag(),
            monitor_file_modification: false,
            delete_previous_file_on_move: true,
        }
    }
}

impl SettingsConfig {
    /// Parse a configuration block from YAML
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

fn default_root_key() -> String {
    "Settings".to_string()
}

fn default_document_tag() -> Option<String> {
    Some("SettingsFile".to_string())
}

fn default_true() -> bool {
    true
}
