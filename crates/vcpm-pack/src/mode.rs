use std::fmt;

use serde::Serialize;

/// Build flavour for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Production,
    Development,
}

impl BuildMode {
    pub fn from_dev_flag(dev: bool) -> Self {
        if dev {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Suffix appended to the archive stem.
    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::Production => "",
            Self::Development => "_dev",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Production => "production",
            Self::Development => "development",
        })
    }
}
