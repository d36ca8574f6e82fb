// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Operator setpoints and their cache.
//!
//! The cache always holds the most recently fetched settings row, or `None`
//! before the first successful fetch. A failed refresh keeps whatever was
//! there, so the control loop degrades to "last known good".

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::traits::{SettingsStore, StorageError};

/// One settings row.
///
/// Every field may be absent in the store; control rules that need a missing
/// setpoint simply do not evaluate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSetting {
    /// CSTR temperature setpoint (°C).
    pub set_cstr_temp: Option<f64>,
    /// Half-width of the DS TDS hysteresis band.
    pub hyst_tds: Option<f64>,
    /// DS TDS setpoint.
    pub set_tds: Option<f64>,
    /// EC setpoint shown on the operator dashboard.
    #[serde(default)]
    pub set_ec: Option<f64>,
    /// Feed level setpoint shown on the operator dashboard.
    #[serde(default)]
    pub set_feed_level: Option<f64>,
}

/// Result of a successful [`SettingsCache::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A row was fetched; `changed` tells whether it differs from the cached one.
    Updated { changed: bool },
    /// The store holds no settings yet; the cache was left as is.
    Empty,
}

#[derive(Default)]
pub struct SettingsCache {
    current: RwLock<Option<ControlSetting>>,
}

impl SettingsCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn read(&self) -> Option<ControlSetting> {
        self.current.read().clone()
    }

    /// Replace the cached settings wholesale.
    pub fn replace(&self, setting: ControlSetting) -> bool {
        let mut current = self.current.write();
        let changed = current.as_ref() != Some(&setting);
        *current = Some(setting);
        changed
    }

    /// Fetch the latest row from `store`.
    ///
    /// The store call runs without holding the cache lock.
    pub async fn refresh(&self, store: &dyn SettingsStore) -> Result<RefreshOutcome, StorageError> {
        match store.latest_setting().await {
            Ok(Some(setting)) => {
                let changed = self.replace(setting);
                if changed {
                    info!(settings = ?self.read(), "Control settings changed");
                } else {
                    debug!("Control settings unchanged");
                }
                crate::metrics::record_settings_refresh("success");
                Ok(RefreshOutcome::Updated { changed })
            }
            Ok(None) => {
                debug!("Settings store is empty");
                crate::metrics::record_settings_refresh("empty");
                Ok(RefreshOutcome::Empty)
            }
            Err(e) => {
                warn!(error = %e, "Settings refresh failed, keeping last known settings");
                crate::metrics::record_settings_refresh("error");
                Err(e)
            }
        }
    }
}
