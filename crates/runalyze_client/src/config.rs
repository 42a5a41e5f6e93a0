use crate::RunalyzeError;
use crate::observability::Verbosity;
use secrecy::SecretString;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "https://runalyze.com";
pub const DEFAULT_COOKIE_PATH: &str = "~/.runalyzedump/runalyze-cookie.json";

#[derive(Clone, Debug)]
pub struct Config {
    pub username: String,
    pub password: SecretString,
    pub base_url: String,
    pub cookie_path: PathBuf,
    pub verbosity: Verbosity,
}

impl Config {
    pub fn from_env() -> Result<Self, RunalyzeError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, RunalyzeError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let username = get("RUNALYZE_USERNAME")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RunalyzeError::Config("RUNALYZE_USERNAME missing".into()))?;
        let password = get("RUNALYZE_PASSWORD")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RunalyzeError::Config("RUNALYZE_PASSWORD missing".into()))?;
        let base_url = get("RUNALYZE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let cookie_path = get("RUNALYZE_COOKIE_PATH").unwrap_or_else(|| DEFAULT_COOKIE_PATH.into());
        let verbosity = match get("LOG_LEVEL") {
            Some(level) => level.parse()?,
            None => Verbosity::default(),
        };
        Ok(Self {
            username,
            password: SecretString::new(password.into()),
            base_url,
            cookie_path: expand_home(&cookie_path)?,
            verbosity,
        })
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf, RunalyzeError> {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return Ok(PathBuf::from(path)),
    };
    let home = dirs::home_dir()
        .ok_or_else(|| RunalyzeError::Config("cannot determine home directory".into()))?;
    if rest.is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}
