//! Configuration loading from `~/.farcall/config.toml` with defaults.

use farcall_types::config::NodeConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load configuration from a TOML file, falling back to defaults.
pub fn load_config(path: Option<&Path>) -> NodeConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<NodeConfig>(&contents) {
                Ok(config) => {
                    info!(path = %config_path.display(), "Loaded configuration");
                    return config;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %config_path.display(),
                        "Failed to parse config, using defaults"
                    );
                }
            },
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to read config file, using defaults"
                );
            }
        }
    } else {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
    }

    NodeConfig::default()
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".farcall")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/farcall/config.toml")));
        assert_eq!(config.registry.port, 1099);
        assert_eq!(config.registry.name, "registry");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
resource_roots = ["/srv/capsules"]

[addressing]
client_host = "203.0.113.9"
client_port = 5000

[registry]
sweep_interval_secs = 60
"#
        )
        .unwrap();

        let config = load_config(Some(file.path()));
        assert_eq!(config.addressing.client_host.as_deref(), Some("203.0.113.9"));
        assert_eq!(config.addressing.client_port, 5000);
        assert_eq!(config.registry.sweep_interval_secs, 60);
        assert_eq!(config.registry.probe_pause_secs, 300);
        assert_eq!(config.resource_roots, vec![PathBuf::from("/srv/capsules")]);
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "registry = [[[").unwrap();
        let config = load_config(Some(file.path()));
        assert_eq!(config.registry.port, 1099);
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with(".farcall/config.toml"));
    }
}
