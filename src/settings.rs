//! Program settings, read from `settings.toml` in the user's config directory.
//!
//! Settings hold defaults for the command line: the log level, the results folder and whether
//! existing results may be overwritten. Scenario data never lives here.
use crate::error::DispatchError;
use crate::get_config_dir;
use crate::input::read_toml;
use crate::log::{DEFAULT_LOG_LEVEL, LOG_LEVEL_ENV_VAR, parse_log_level};
use anyhow::{Context, Result};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

/// If this environment variable is set, the settings file is ignored
const USE_DEFAULT_SETTINGS_ENV_VAR: &str = "POWERDISPATCH_USE_DEFAULT_SETTINGS";

/// Get the path to where the settings file will be read from
pub fn get_settings_file_path() -> PathBuf {
    get_config_dir().join(SETTINGS_FILE_NAME)
}

/// Defaults for the command line options
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Log level (off, error, warn, info, debug or trace)
    pub log_level: String,
    /// Whether an existing results folder may be replaced
    pub overwrite: bool,
    /// Whether to write the LP of every window and the shadow prices of limits
    pub debug_model: bool,
    /// Folder holding one results folder per scenario. Graphs go in its `graphs` subfolder.
    pub results_root: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            overwrite: false,
            debug_model: false,
            results_root: PathBuf::from("powerdispatch_results"),
        }
    }
}

impl Settings {
    /// Load the user's settings.
    ///
    /// Defaults are used if there is no settings file or `POWERDISPATCH_USE_DEFAULT_SETTINGS` is
    /// set.
    pub fn load() -> Result<Settings> {
        if env::var_os(USE_DEFAULT_SETTINGS_ENV_VAR).is_some() {
            return Ok(Settings::default());
        }

        Self::load_from_path(&get_settings_file_path())
    }

    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        let settings: Settings = read_toml(file_path)?;
        parse_log_level(&settings.log_level)
            .map_err(|err| DispatchError::Configuration(err.to_string()))
            .with_context(|| format!("Invalid settings file {}", file_path.display()))?;

        Ok(settings)
    }

    /// A settings file listing every option with its default, commented out
    pub fn default_file_contents() -> String {
        let settings_raw = toml::to_string(&Settings::default())
            .expect("Default settings can always be serialised");

        let options = settings_raw.lines().filter_map(|line| {
            let (field, _) = line.split_once('=')?;
            let docs = Settings::get_field_docs(field.trim()).expect("Settings fields have docs");
            Some(format!("\n# # {docs}\n# {line}\n"))
        });

        format!(
            "# Program settings for powerdispatch v{}.\n\
             #\n\
             # Uncomment an option to change it. The {} environment variable\n\
             # overrides log_level, and setting {} ignores this file.\n{}",
            env!("CARGO_PKG_VERSION"),
            LOG_LEVEL_ENV_VAR,
            USE_DEFAULT_SETTINGS_ENV_VAR,
            options.collect::<String>()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_without_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME); // NB: doesn't exist
        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings::default()
        );
    }

    #[test]
    fn load_overrides_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&file_path, "log_level = \"warn\"\ndebug_model = true\n").unwrap();

        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings {
                log_level: "warn".to_string(),
                debug_model: true,
                ..Settings::default()
            }
        );
    }

    #[test]
    fn load_bad_log_level() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&file_path, "log_level = \"verbose\"\n").unwrap();

        let err = Settings::load_from_path(&file_path).unwrap_err();
        assert!(matches!(
            DispatchError::find_in(&err),
            Some(DispatchError::Configuration(_))
        ));
    }

    #[test]
    fn load_unknown_option() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&file_path, "results_folder = \"results\"\n").unwrap();
        assert!(Settings::load_from_path(&file_path).is_err());
    }

    #[test]
    fn default_file_contents_round_trip() {
        let contents = Settings::default_file_contents();
        assert!(contents.contains("# log_level = \"info\""));
        assert!(contents.contains("# # Whether an existing results folder may be replaced"));

        // Uncommenting every option gives back the defaults
        let uncommented: String = contents
            .lines()
            .filter_map(|line| line.strip_prefix("# "))
            .filter(|line| line.contains('='))
            .map(|line| format!("{line}\n"))
            .collect();
        let settings: Settings = toml::from_str(&uncommented).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
