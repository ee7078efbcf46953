//! Platform-specific locations for endpoint state and configuration

use std::path::PathBuf;

const APP_DIR: &str = "keyrelay";

/// Get the platform-specific data directory for endpoint state
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\keyrelay
/// - macOS: ~/Library/Application Support/keyrelay
/// - Linux/Other: ~/.local/share/keyrelay
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the platform-specific config directory
///
/// Returns:
/// - Windows: %APPDATA%\keyrelay
/// - macOS: ~/Library/Application Support/keyrelay
/// - Linux/Other: ~/.config/keyrelay
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Default location of the persisted endpoint state
pub fn get_default_state_path() -> PathBuf {
    get_data_dir().join("state.json")
}

/// Default location of the client configuration
pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_app_dir() {
        assert!(get_data_dir().ends_with(APP_DIR));
        assert!(get_config_dir().ends_with(APP_DIR));
        assert!(get_default_state_path().ends_with("keyrelay/state.json"));
        assert!(get_default_config_path().ends_with("keyrelay/config.toml"));
    }
}
