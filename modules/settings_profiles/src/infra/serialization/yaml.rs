//! YAML settings file serializer
//!
//! File layout:
//!
//! ```yaml
//! !SettingsFile
//! Settings:
//!     Editor/FontSize: 13
//! ```

use super::events::{events_to_value, tag_name, value_to_events};
use crate::config::SettingsConfig;
use crate::contract::SettingsDocument;
use crate::domain::collaborators::SettingsSerializer;
use anyhow::{bail, Context, Result};
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value};
use std::io::{Read, Write};

pub struct YamlSettingsSerializer {
    root_key: String,
    document_tag: Option<String>,
}

impl YamlSettingsSerializer {
    pub fn new(root_key: impl Into<String>, document_tag: Option<String>) -> Self {
        Self {
            root_key: root_key.into(),
            document_tag,
        }
    }

    pub fn from_config(config: &SettingsConfig) -> Self {
        Self::new(config.root_key.clone(), config.document_tag.clone())
    }
}

impl Default for YamlSettingsSerializer {
    fn default() -> Self {
        Self::from_config(&SettingsConfig::default())
    }
}

impl SettingsSerializer for YamlSettingsSerializer {
    fn serialize(&self, writer: &mut dyn Write, document: &SettingsDocument) -> Result<()> {
        let mut settings = Mapping::new();
        for (name, events) in document.iter() {
            let value = events_to_value(events)
                .with_context(|| format!("invalid value for setting {}", name))?;
            settings.insert(Value::String(name.clone()), value);
        }

        let mut root = Mapping::new();
        root.insert(Value::String(self.root_key.clone()), Value::Mapping(settings));
        let root = match self.document_tag.as_deref() {
            Some(tag) if !tag.is_empty() => Value::Tagged(Box::new(TaggedValue {
                tag: Tag::new(tag),
                value: Value::Mapping(root),
            })),
            _ => Value::Mapping(root),
        };

        serde_yaml::to_writer(writer, &root)?;
        Ok(())
    }

    fn deserialize(&self, reader: &mut dyn Read) -> Result<SettingsDocument> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let mut document = SettingsDocument::new();
        if text.trim().is_empty() {
            return Ok(document);
        }

        let tree: Value = serde_yaml::from_str(&text)?;
        let tree = match tree {
            Value::Tagged(tagged) => {
                if let Some(expected) = self.document_tag.as_deref() {
                    let found = tag_name(&tagged.tag);
                    if found != expected {
                        tracing::debug!(expected, found = %found, "Unexpected settings document tag");
                    }
                }
                tagged.value
            }
            other => other,
        };

        let root = match tree {
            Value::Null => return Ok(document),
            Value::Mapping(root) => root,
            other => bail!("settings document must be a mapping, found {:?}", other),
        };

        match root.get(self.root_key.as_str()) {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(settings)) => {
                for (name, value) in settings {
                    let Some(name) = name.as_str() else {
                        bail!("setting names must be strings, found {:?}", name);
                    };
                    document.insert(name, value_to_events(value));
                }
            }
            Some(other) => bail!("'{}' must be a mapping, found {:?}", self.root_key, other),
        }

        Ok(document)
    }
}
