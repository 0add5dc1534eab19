//! Transaction intents

use serde::{Deserialize, Serialize};
use std::fmt;

/// The intent a transaction was started for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    InstallPackages,
    RemovePackages,
    UpdatePackages,
    UpdateSystem,
    RefreshCache,
    DownloadPackages,
    SearchName,
    Resolve,
}

impl Role {
    /// Query roles never take the system lock
    #[must_use]
    pub fn is_query(self) -> bool {
        matches!(self, Self::SearchName | Self::Resolve)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InstallPackages => "install-packages",
            Self::RemovePackages => "remove-packages",
            Self::UpdatePackages => "update-packages",
            Self::UpdateSystem => "update-system",
            Self::RefreshCache => "refresh-cache",
            Self::DownloadPackages => "download-packages",
            Self::SearchName => "search-name",
            Self::Resolve => "resolve",
        };
        f.write_str(s)
    }
}

/// Installed-state filter for query roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Filter {
    #[default]
    None,
    Installed,
    NotInstalled,
}

impl Filter {
    #[must_use]
    pub fn accepts(self, installed: bool) -> bool {
        match self {
            Self::None => true,
            Self::Installed => installed,
            Self::NotInstalled => !installed,
        }
    }
}

// Implement clap::ValueEnum for Filter
impl clap::ValueEnum for Filter {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::None, Self::Installed, Self::NotInstalled]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::None => clap::builder::PossibleValue::new("none"),
            Self::Installed => clap::builder::PossibleValue::new("installed"),
            Self::NotInstalled => clap::builder::PossibleValue::new("not-installed"),
        })
    }
}
