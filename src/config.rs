// Runtime settings for the importer.
//
// Values are layered: built-in defaults, then an optional TOML file in
// the user's home directory (or `--config`), then `CATALOG_IMPORTER_*`
// environment variables. Command-line flags are applied last by `main`.

use crate::error::{ImportError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "https://api.deliverect.io";
pub const DEFAULT_AUDIENCE: &str = "https://api.deliverect.com";
/// Accounts must be linked to this developer account before importing.
pub const DEVELOPER_ACCOUNT_ID: &str = "690ca201b9c6f85ca05b6eb1";
pub const DEFAULT_PAGE_SIZE: u32 = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const CONFIG_FILE_NAME: &str = ".catalog_importer.toml";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_base_url: String,
    pub token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub audience: String,
    pub developer_account_id: String,
    pub page_size: u32,
    pub timeout_secs: u64,
    /// Skip rows with an empty Category 1, Category 2 or Plu instead of
    /// failing the whole file.
    pub skip_incomplete_rows: bool,
    pub dedupe_plus: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_base_url: DEFAULT_API_URL.into(),
            token: None,
            client_id: None,
            client_secret: None,
            audience: DEFAULT_AUDIENCE.into(),
            developer_account_id: DEVELOPER_ACCOUNT_ID.into(),
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            skip_incomplete_rows: true,
            dedupe_plus: false,
        }
    }
}

/// Shape of the optional TOML file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    api_base_url: Option<String>,
    token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    audience: Option<String>,
    developer_account_id: Option<String>,
    page_size: Option<u32>,
    timeout_secs: Option<u64>,
}

impl Settings {
    /// Load defaults, the config file and the environment.
    ///
    /// An explicit `config_path` must exist; the default file in the home
    /// directory is only read when present.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut settings = Settings::default();
        match config_path {
            Some(path) => settings.apply_file(path)?,
            None => {
                if let Some(path) = default_config_path().filter(|p| p.exists()) {
                    settings.apply_file(&path)?;
                }
            }
        }
        settings.apply_env_with(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file: FileSettings = toml::from_str(&raw)
            .map_err(|e| ImportError::Config(format!("invalid {}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "loaded config file");

        if let Some(v) = file.api_base_url {
            self.api_base_url = v;
        }
        if file.token.is_some() {
            self.token = file.token;
        }
        if file.client_id.is_some() {
            self.client_id = file.client_id;
        }
        if file.client_secret.is_some() {
            self.client_secret = file.client_secret;
        }
        if let Some(v) = file.audience {
            self.audience = v;
        }
        if let Some(v) = file.developer_account_id {
            self.developer_account_id = v;
        }
        if let Some(v) = file.page_size {
            self.page_size = v;
        }
        if let Some(v) = file.timeout_secs {
            self.timeout_secs = v;
        }
        Ok(())
    }

    /// Overlay `CATALOG_IMPORTER_*` variables read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("CATALOG_IMPORTER_API_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = var("CATALOG_IMPORTER_TOKEN") {
            self.token = Some(v);
        }
        if let Some(v) = var("CATALOG_IMPORTER_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = var("CATALOG_IMPORTER_CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = var("CATALOG_IMPORTER_AUDIENCE") {
            self.audience = v;
        }
        if let Some(v) = var("CATALOG_IMPORTER_DEVELOPER_ACCOUNT") {
            self.developer_account_id = v;
        }
        if let Some(v) = var("CATALOG_IMPORTER_PAGE_SIZE") {
            self.page_size = v.trim().parse().map_err(|_| {
                ImportError::Config(format!("CATALOG_IMPORTER_PAGE_SIZE is not a number: {}", v))
            })?;
        }
        if let Some(v) = var("CATALOG_IMPORTER_TIMEOUT") {
            self.timeout_secs = v.trim().parse().map_err(|_| {
                ImportError::Config(format!("CATALOG_IMPORTER_TIMEOUT is not a number: {}", v))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ImportError::Config("page size must be at least 1".into()));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ImportError::Config("API base URL is empty".into()));
        }
        Ok(())
    }
}

/// `~/.catalog_importer.toml`, when a home directory can be found.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_remote_service() {
        let s = Settings::default();
        assert_eq!(s.api_base_url, "https://api.deliverect.io");
        assert_eq!(s.page_size, 500);
        assert!(s.skip_incomplete_rows);
        assert!(!s.dedupe_plus);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn env_overrides_defaults() {
        let vars = env(&[
            ("CATALOG_IMPORTER_API_URL", "http://localhost:9000"),
            ("CATALOG_IMPORTER_TOKEN", "abc"),
            ("CATALOG_IMPORTER_PAGE_SIZE", "50"),
        ]);
        let mut s = Settings::default();
        s.apply_env_with(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(s.api_base_url, "http://localhost:9000");
        assert_eq!(s.token.as_deref(), Some("abc"));
        assert_eq!(s.page_size, 50);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let vars = env(&[("CATALOG_IMPORTER_TOKEN", "  ")]);
        let mut s = Settings::default();
        s.apply_env_with(|k| vars.get(k).cloned()).unwrap();
        assert!(s.token.is_none());
    }

    #[test]
    fn bad_page_size_is_a_config_error() {
        let vars = env(&[("CATALOG_IMPORTER_PAGE_SIZE", "lots")]);
        let mut s = Settings::default();
        let err = s.apply_env_with(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));

        s.page_size = 0;
        assert!(matches!(s.validate(), Err(ImportError::Config(_))));
    }

    #[test]
    fn file_values_are_applied() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "api_base_url = \"http://catalog.test\"\nclient_id = \"id\"\nclient_secret = \"secret\"\npage_size = 100"
        )
        .unwrap();

        let mut s = Settings::default();
        s.apply_file(file.path()).unwrap();
        assert_eq!(s.api_base_url, "http://catalog.test");
        assert_eq!(s.client_id.as_deref(), Some("id"));
        assert_eq!(s.client_secret.as_deref(), Some("secret"));
        assert_eq!(s.page_size, 100);
        assert!(s.token.is_none());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));
    }
}
