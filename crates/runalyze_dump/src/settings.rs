//! Layered settings: config file, then environment, then command-line flags.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use runalyze_client::config::{Config, expand_home};
use runalyze_client::observability::Verbosity;
use serde::Deserialize;

use crate::error::{DumpError, DumpResult};

pub const DEFAULT_CONFIG_PATH: &str = "~/.runalyzedump/runalyzedump.toml";
pub const DEFAULT_SAVE_DIR: &str = "~/.runalyzedump/activities";

const USERNAME: &str = "RUNALYZE_USERNAME";
const PASSWORD: &str = "RUNALYZE_PASSWORD";
const COOKIE_PATH: &str = "RUNALYZE_COOKIE_PATH";
const BASE_URL: &str = "RUNALYZE_BASE_URL";
const SAVE_DIR: &str = "RUNALYZE_SAVE_DIR";
const LOG_LEVEL: &str = "LOG_LEVEL";

/// Keys accepted in the TOML config file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FileSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub cookie_path: Option<String>,
    pub save_dir: Option<String>,
    pub base_url: Option<String>,
    pub log_level: Option<String>,
}

impl FileSettings {
    /// Read the config file. An explicit path must exist; the default one may not.
    pub fn load(explicit: Option<&Path>) -> DumpResult<Self> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => (expand_home(DEFAULT_CONFIG_PATH).map_err(config_error)?, false),
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                tracing::debug!(path = %path.display(), "loaded config file");
                Self::parse(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file");
                Ok(Self::default())
            }
            Err(e) => Err(DumpError::Config(format!(
                "reading {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn parse(text: &str) -> DumpResult<Self> {
        Ok(toml::from_str(text)?)
    }

    fn get(&self, key: &str) -> Option<String> {
        match key {
            USERNAME => self.username.clone(),
            PASSWORD => self.password.clone(),
            COOKIE_PATH => self.cookie_path.clone(),
            SAVE_DIR => self.save_dir.clone(),
            BASE_URL => self.base_url.clone(),
            LOG_LEVEL => self.log_level.clone(),
            _ => None,
        }
    }
}

/// Values given on the command line. `None` means "not given".
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub username: Option<String>,
    pub password: Option<String>,
    pub cookie_path: Option<String>,
    pub save_dir: Option<String>,
    pub log_level: Option<String>,
    pub until: Option<String>,
    pub since: Option<String>,
    pub json: bool,
}

impl CliOverrides {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            USERNAME => self.username.clone(),
            PASSWORD => self.password.clone(),
            COOKIE_PATH => self.cookie_path.clone(),
            SAVE_DIR => self.save_dir.clone(),
            LOG_LEVEL => self.log_level.clone(),
            _ => None,
        }
    }
}

/// Everything a download run needs, fully resolved.
#[derive(Clone, Debug)]
pub struct Settings {
    pub client: Config,
    /// Level given on the command line, in the environment or in the file.
    pub log_level: Option<Verbosity>,
    pub save_dir: PathBuf,
    pub until: Option<String>,
    pub since: Option<String>,
    pub json: bool,
}

impl Settings {
    pub fn resolve_from_env(file: &FileSettings, cli: CliOverrides) -> DumpResult<Self> {
        Self::resolve(file, |k| std::env::var(k).ok(), cli)
    }

    /// Merge the layers; the command line wins over the environment, which
    /// wins over the config file.
    pub fn resolve<F>(file: &FileSettings, mut env: F, cli: CliOverrides) -> DumpResult<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut merged: HashMap<&str, String> = HashMap::new();
        for key in [USERNAME, PASSWORD, COOKIE_PATH, BASE_URL, SAVE_DIR, LOG_LEVEL] {
            let value = non_empty(cli.get(key))
                .or_else(|| non_empty(env(key)))
                .or_else(|| non_empty(file.get(key)));
            if let Some(value) = value {
                merged.insert(key, value);
            }
        }

        if !merged.contains_key(USERNAME) {
            return Err(DumpError::validation(
                "username is required (--username, RUNALYZE_USERNAME or config file)",
            ));
        }
        if !merged.contains_key(PASSWORD) {
            return Err(DumpError::validation(
                "password is required (--password, RUNALYZE_PASSWORD or config file)",
            ));
        }

        let client = Config::from_env_with(|k| merged.get(k).cloned()).map_err(config_error)?;
        let save_dir = merged
            .get(SAVE_DIR)
            .map(String::as_str)
            .unwrap_or(DEFAULT_SAVE_DIR);
        let log_level = merged.contains_key(LOG_LEVEL).then_some(client.verbosity);
        Ok(Self {
            client,
            log_level,
            save_dir: expand_home(save_dir).map_err(config_error)?,
            until: cli.until,
            since: cli.since,
            json: cli.json,
        })
    }

    /// `EnvFilter` directives for the subscriber. A configured level wins
    /// over `RUST_LOG`, which may carry full directives; default `info`.
    pub fn log_filter(&self, rust_log: Option<String>) -> String {
        let base = match (self.log_level, non_empty(rust_log)) {
            (Some(level), _) => level.as_str().to_string(),
            (None, Some(directives)) => directives,
            (None, None) => Verbosity::Info.as_str().to_string(),
        };
        format!("{base},reqwest=warn,hyper=warn,hyper_util=warn")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn config_error(err: runalyze_client::RunalyzeError) -> DumpError {
    match err {
        runalyze_client::RunalyzeError::Config(msg) => DumpError::Config(msg),
        other => DumpError::Config(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn file_keys_are_kebab_case() {
        let file = FileSettings::parse(
            r#"
username = "from-file"
password = "pw"
cookie-path = "/tmp/c.json"
save-dir = "/tmp/acts"
log-level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(file.username.as_deref(), Some("from-file"));
        assert_eq!(file.cookie_path.as_deref(), Some("/tmp/c.json"));
        assert_eq!(file.save_dir.as_deref(), Some("/tmp/acts"));
    }

    #[test]
    fn malformed_file_is_config_error() {
        assert!(matches!(
            FileSettings::parse("username = ["),
            Err(DumpError::Config(_))
        ));
    }

    #[test]
    fn cli_beats_env_beats_file() {
        let file = FileSettings {
            username: Some("file-user".into()),
            password: Some("file-pw".into()),
            save_dir: Some("/file/acts".into()),
            log_level: Some("debug".into()),
            ..Default::default()
        };
        let env = |k: &str| match k {
            "RUNALYZE_USERNAME" => Some("env-user".into()),
            "RUNALYZE_SAVE_DIR" => Some("/env/acts".into()),
            _ => None,
        };
        let cli = CliOverrides {
            username: Some("cli-user".into()),
            until: Some("2024-06".into()),
            json: true,
            ..Default::default()
        };
        let settings = Settings::resolve(&file, env, cli).unwrap();
        assert_eq!(settings.client.username, "cli-user");
        assert_eq!(settings.client.password.expose_secret(), "file-pw");
        assert_eq!(settings.save_dir, PathBuf::from("/env/acts"));
        assert_eq!(settings.client.verbosity, Verbosity::Debug);
        assert_eq!(settings.until.as_deref(), Some("2024-06"));
        assert!(settings.json);
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let cli = CliOverrides {
            username: Some("me".into()),
            ..Default::default()
        };
        let err = Settings::resolve(&FileSettings::default(), no_env, cli).unwrap_err();
        assert!(matches!(err, DumpError::Validation(_)));
        assert!(err.to_string().contains("password is required"));

        let err = Settings::resolve(&FileSettings::default(), no_env, CliOverrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("username is required"));
    }

    #[test]
    fn empty_values_do_not_mask_lower_layers() {
        let file = FileSettings {
            username: Some("file-user".into()),
            password: Some("pw".into()),
            ..Default::default()
        };
        let cli = CliOverrides {
            username: Some(String::new()),
            ..Default::default()
        };
        let settings = Settings::resolve(&file, no_env, cli).unwrap();
        assert_eq!(settings.client.username, "file-user");
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            FileSettings::load(Some(&missing)),
            Err(DumpError::Config(_))
        ));

        let present = dir.path().join("cfg.toml");
        std::fs::write(&present, "username = \"u\"\n").unwrap();
        let file = FileSettings::load(Some(&present)).unwrap();
        assert_eq!(file.username.as_deref(), Some("u"));
    }

    fn credentials() -> FileSettings {
        FileSettings {
            username: Some("u".into()),
            password: Some("p".into()),
            ..Default::default()
        }
    }

    #[test]
    fn file_log_level_drives_client_and_filter() {
        let file = FileSettings {
            log_level: Some("trace".into()),
            ..credentials()
        };
        let settings = Settings::resolve(&file, no_env, CliOverrides::default()).unwrap();
        assert_eq!(settings.client.verbosity, Verbosity::Trace);
        assert_eq!(
            settings.log_filter(Some("warn".into())),
            "trace,reqwest=warn,hyper=warn,hyper_util=warn"
        );
    }

    #[test]
    fn rust_log_directives_apply_without_a_level() {
        let settings =
            Settings::resolve(&credentials(), no_env, CliOverrides::default()).unwrap();
        assert_eq!(settings.log_level, None);
        assert_eq!(
            settings.log_filter(Some("debug,runalyze_client=trace".into())),
            "debug,runalyze_client=trace,reqwest=warn,hyper=warn,hyper_util=warn"
        );
        assert_eq!(
            settings.log_filter(None),
            "info,reqwest=warn,hyper=warn,hyper_util=warn"
        );
    }

    #[test]
    fn directive_style_log_level_is_a_config_error() {
        let cli = CliOverrides {
            log_level: Some("info,reqwest=debug".into()),
            ..Default::default()
        };
        let err = Settings::resolve(&credentials(), no_env, cli).unwrap_err();
        assert!(matches!(err, DumpError::Config(_)));
    }
}
