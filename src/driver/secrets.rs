//! The section-grouped configuration store.
//!
//! A single YAML file maps sections to key/value pairs. Lookups never fail
//! for a missing section or key; only an unreadable file is a hard error,
//! since without it no destination or credential is known.

use crate::driver::result_error::error::Error;
use crate::driver::result_error::result::Result;
use crate::driver::result_error::WithMsg;
use serde::Deserialize;
use serde_yml::Value;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

/// File name of the store inside the configuration directory
pub static CONFIG_FILE: &str = "secrets.yml";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct SecretStore {
    sections: HashMap<String, HashMap<String, Value>>,
}

impl SecretStore {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::ConfigUnreadable {
            path: path.to_owned(),
            source,
        })?;
        serde_yml::from_reader(file)
            .map_err(Error::from)
            .with_msg(format!("Parse failed for configuration {:?}", path))
    }

    /// Looks up `key` inside `section`, stringifying scalar values.
    ///
    /// Absent sections, absent keys and null values all resolve to `None`.
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        match self.sections.get(section)?.get(key)? {
            Value::String(value) => Some(value.clone()),
            Value::Bool(value) => Some(value.to_string()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    /// Interprets a key with conventional truthy tokens.
    ///
    /// A present but unparsable value is an error, absence is `None`.
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        let Some(raw) = self.get(section, key) else {
            return Ok(None);
        };
        match raw.to_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Ok(Some(true)),
            "0" | "no" | "false" | "off" => Ok(Some(false)),
            _ => Err(Error::InvalidBoolean {
                section: section.to_owned(),
                key: key.to_owned(),
                value: raw,
            }),
        }
    }
}

impl FromStr for SecretStore {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_yml::from_str(s).map_err(Error::from)
    }
}
