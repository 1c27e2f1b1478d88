//! Runtime configuration, stored in ~/.shift-roster/config.json.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterConfig {
    /// Base URL of the remote row store's REST endpoint.
    pub store_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_api_key: Option<String>,
    /// Periods in years >= this resolve against the remote store; earlier
    /// ones against the local archive.
    #[serde(default = "default_cutoff_year")]
    pub cutoff_year: i32,
    /// Local archive database. Defaults to ~/.shift-roster/roster.db.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Expected hours accrued per month of service, used for balance
    /// targets. Absent means balances report hours without a target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_target_hours: Option<f64>,
    #[serde(default = "default_balance_low")]
    pub balance_low_hours: f64,
    #[serde(default = "default_balance_high")]
    pub balance_high_hours: f64,
}

fn default_cutoff_year() -> i32 {
    2025
}

fn default_balance_low() -> f64 {
    60.0
}

fn default_balance_high() -> f64 {
    90.0
}

/// Load configuration from ~/.shift-roster/config.json, then apply
/// environment overrides (`ROSTER_STORE_URL`, `ROSTER_STORE_KEY`) so
/// credentials can stay out of the file.
pub fn load_config() -> Result<RosterConfig, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    let config_path = home.join(".shift-roster").join("config.json");

    if !config_path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"storeUrl\": \"https://...\" }}",
            config_path.display()
        ));
    }

    let content = std::fs::read_to_string(&config_path)
        .map_err(|e| format!("Failed to read config: {}", e))?;

    let mut config: RosterConfig =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    if let Ok(url) = std::env::var("ROSTER_STORE_URL") {
        config.store_url = url;
    }
    if let Ok(key) = std::env::var("ROSTER_STORE_KEY") {
        config.store_api_key = Some(key);
    }

    if config.balance_low_hours > config.balance_high_hours {
        return Err(format!(
            "balanceLowHours ({}) exceeds balanceHighHours ({})",
            config.balance_low_hours, config.balance_high_hours
        ));
    }

    Ok(config)
}
