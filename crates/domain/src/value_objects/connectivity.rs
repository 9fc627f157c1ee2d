//! Reachability signal reported by the platform

use serde::{Deserialize, Serialize};

/// Current network reachability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// No network; drains are halted
    #[default]
    Offline,
    /// Unmetered network
    Wifi,
    /// Metered network
    Cellular,
}

impl Connectivity {
    /// Whether any network is reachable
    pub const fn is_online(&self) -> bool {
        !matches!(self, Self::Offline)
    }

    /// Whether syncing may run under the given WiFi-only preference
    pub const fn allows_sync(&self, wifi_only: bool) -> bool {
        match self {
            Self::Offline => false,
            Self::Wifi => true,
            Self::Cellular => !wifi_only,
        }
    }
}
