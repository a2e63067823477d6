use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Settings a manager pushes down to every store it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub soft_delete: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 1000,
            soft_delete: false,
        }
    }
}

impl ManagerOptions {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigurationError> {
        let options: Self = toml::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.default_page_size == 0 {
            return Err(ConfigurationError::InvalidOptions(
                "default_page_size must be at least 1".into(),
            ));
        }
        if self.max_page_size < self.default_page_size {
            return Err(ConfigurationError::InvalidOptions(format!(
                "max_page_size ({}) is below default_page_size ({})",
                self.max_page_size, self.default_page_size
            )));
        }
        Ok(())
    }
}
