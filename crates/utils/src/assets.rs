use std::path::PathBuf;

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");
const ASSET_DIR_ENV: &str = "FIXDESK_ASSET_DIR";

/// Directory holding the SQLite database and `config.json`.
///
/// `FIXDESK_ASSET_DIR` wins when set; debug builds otherwise use
/// `dev_assets/` at the workspace root, release builds the platform data dir.
pub fn asset_dir() -> PathBuf {
    let path = match std::env::var(ASSET_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir.trim()),
        _ if cfg!(debug_assertions) => PathBuf::from(PROJECT_ROOT).join("../../dev_assets"),
        _ => match ProjectDirs::from("org", "fixdesk", "fixdesk") {
            Some(dirs) => dirs.data_dir().to_path_buf(),
            None => std::env::temp_dir().join("fixdesk"),
        },
    };

    if !path.exists() {
        if let Err(err) = std::fs::create_dir_all(&path) {
            tracing::warn!(path = %path.display(), "Failed to create asset directory: {err}");
        }
    }

    path
    // Linux   → ~/.local/share/fixdesk
    // macOS   → ~/Library/Application Support/org.fixdesk.fixdesk
    // Windows → %APPDATA%\fixdesk\fixdesk\data
}

pub fn config_path() -> PathBuf {
    asset_dir().join("config.json")
}
