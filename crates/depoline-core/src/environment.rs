//! Destination environment selection

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    /// `--production` wins over `--sandbox`; sandbox is the default.
    pub fn from_flags(production: bool) -> Self {
        if production {
            Self::Production
        } else {
            Self::Sandbox
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }

    /// Environment variable holding the API token for this environment.
    pub fn token_var(self) -> &'static str {
        match self {
            Self::Sandbox => "ZENODO_SANDBOX_TOKEN",
            Self::Production => "ZENODO_PRODUCTION_TOKEN",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
