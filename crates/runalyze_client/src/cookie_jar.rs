//! Cookie jar that survives process restarts.
//!
//! [`SessionStore`] plugs into reqwest as a [`CookieStore`]. Every response that
//! sets cookies rewrites the JSON file on disk so a later run can reuse the
//! logged-in session without posting credentials again.

use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::RunalyzeError;

/// One persisted cookie. This is the on-disk JSON shape.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl CookieEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn same_slot(&self, other: &CookieEntry) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.secure && url.scheme() != "https" {
            return false;
        }
        domain_matches(host, &self.domain) && url.path().starts_with(&self.path)
    }
}

enum CookieUpdate {
    Store(CookieEntry),
    Remove(CookieEntry),
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn parse_set_cookie(raw: &str, url: &Url, now: DateTime<Utc>) -> Option<CookieUpdate> {
    let parsed = cookie::Cookie::parse(raw.to_owned()).ok()?;
    let domain = match parsed.domain() {
        Some(d) => d.trim_start_matches('.').to_ascii_lowercase(),
        None => url.host_str()?.to_ascii_lowercase(),
    };
    let expires = match parsed.max_age().map(|d| d.whole_seconds()) {
        Some(secs) if secs <= 0 => Some(now),
        // lifetimes past chrono's range never expire
        Some(secs) => Duration::try_seconds(secs).and_then(|d| now.checked_add_signed(d)),
        None => parsed
            .expires_datetime()
            .and_then(|at| DateTime::<Utc>::from_timestamp(at.unix_timestamp(), 0)),
    };
    let entry = CookieEntry {
        name: parsed.name().to_string(),
        value: parsed.value().to_string(),
        domain,
        path: parsed.path().unwrap_or("/").to_string(),
        expires,
        secure: parsed.secure().unwrap_or(false),
        http_only: parsed.http_only().unwrap_or(false),
        same_site: parsed.same_site().map(|s| s.to_string()),
    };
    if entry.is_expired(now) {
        Some(CookieUpdate::Remove(entry))
    } else {
        Some(CookieUpdate::Store(entry))
    }
}

/// Persistent, mutex-guarded cookie jar for one tracking site.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    canonical_domain: String,
    cookies: Mutex<Vec<CookieEntry>>,
}

impl SessionStore {
    /// Create the store, making sure the parent directory exists, and load any
    /// previously saved cookies. A missing file is not an error.
    pub fn open(
        path: impl Into<PathBuf>,
        canonical_domain: impl Into<String>,
    ) -> Result<Self, RunalyzeError> {
        let store = Self {
            path: path.into(),
            canonical_domain: canonical_domain.into(),
            cookies: Mutex::new(Vec::new()),
        };
        if let Some(dir) = store.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                RunalyzeError::Session(format!("creating {}: {e}", dir.display()))
            })?;
        }
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn canonical_domain(&self) -> &str {
        &self.canonical_domain
    }

    /// Snapshot of the cookies currently held in memory.
    pub fn entries(&self) -> Vec<CookieEntry> {
        self.lock().clone()
    }

    /// Replace the in-memory jar with the file contents. Returns the number of
    /// cookies loaded.
    pub fn load(&self) -> Result<usize, RunalyzeError> {
        tracing::debug!(path = %self.path.display(), "loading cookies");
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "cookie file does not exist");
                return Ok(0);
            }
            Err(e) => {
                return Err(RunalyzeError::Session(format!(
                    "reading {}: {e}",
                    self.path.display()
                )));
            }
        };
        let entries: Vec<CookieEntry> = serde_json::from_slice(&data)
            .map_err(|e| RunalyzeError::Session(format!("decoding cookies: {e}")))?;

        let now = Utc::now();
        let loaded: Vec<CookieEntry> = entries
            .into_iter()
            .map(|e| self.assign_default_domain(e))
            .filter(|e| !e.is_expired(now))
            .collect();
        for entry in &loaded {
            tracing::trace!(name = %entry.name, domain = %entry.domain, "loaded cookie");
        }
        let count = loaded.len();
        *self.lock() = loaded;
        tracing::debug!(count, "loaded cookie entries");
        Ok(count)
    }

    /// Write the site's cookies to disk with owner-only permissions.
    pub fn save(&self) -> Result<(), RunalyzeError> {
        let cookies = self.lock();
        self.write(&cookies)
    }

    /// Cookies saved without a domain belong to the tracking site. The site
    /// emits some cookies that way and older cookie files stored them like that.
    fn assign_default_domain(&self, mut entry: CookieEntry) -> CookieEntry {
        if entry.domain.trim().is_empty() {
            entry.domain = self.canonical_domain.clone();
        }
        entry
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CookieEntry>> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, cookies: &[CookieEntry]) -> Result<(), RunalyzeError> {
        let now = Utc::now();
        let site: Vec<&CookieEntry> = cookies
            .iter()
            .filter(|c| !c.is_expired(now) && domain_matches(&self.canonical_domain, &c.domain))
            .collect();
        tracing::trace!(path = %self.path.display(), count = site.len(), "saving cookies");
        let data = serde_json::to_vec_pretty(&site)
            .map_err(|e| RunalyzeError::Session(format!("encoding cookies: {e}")))?;
        write_private(&self.path, &data)
            .map_err(|e| RunalyzeError::Session(format!("writing {}: {e}", self.path.display())))
    }
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

impl CookieStore for SessionStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let now = Utc::now();
        let mut cookies = self.lock();
        let mut changed = false;
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            match parse_set_cookie(raw, url, now) {
                Some(CookieUpdate::Store(entry)) => {
                    tracing::trace!(name = %entry.name, domain = %entry.domain, "storing cookie");
                    cookies.retain(|c| !c.same_slot(&entry));
                    cookies.push(entry);
                    changed = true;
                }
                Some(CookieUpdate::Remove(entry)) => {
                    tracing::trace!(name = %entry.name, "removing cookie");
                    cookies.retain(|c| !c.same_slot(&entry));
                    changed = true;
                }
                None => tracing::debug!(url = %url, "ignoring malformed set-cookie header"),
            }
        }
        if changed {
            // Cookies stay valid in memory even when the file cannot be written.
            if let Err(e) = self.write(&cookies) {
                tracing::warn!(error = %e, "failed to save cookies");
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let now = Utc::now();
        let cookies = self.lock();
        let pairs: Vec<String> = cookies
            .iter()
            .filter(|c| !c.is_expired(now) && c.matches(url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        HeaderValue::from_str(&pairs.join("; ")).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn set(store: &SessionStore, headers: &[&str], at: &str) {
        let values: Vec<HeaderValue> = headers
            .iter()
            .map(|h| HeaderValue::from_str(h).unwrap())
            .collect();
        let mut iter = values.iter();
        store.set_cookies(&mut iter, &url(at));
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("nested/cookie.json"), "runalyze.com")
            .expect("open");
        assert!(store.entries().is_empty());
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn set_cookie_is_saved_immediately_and_reloaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookie.json");
        let store = SessionStore::open(&path, "runalyze.com").unwrap();
        set(
            &store,
            &["PHPSESSID=abc; Path=/; HttpOnly; SameSite=Lax", "REMEMBERME=xyz; Max-Age=3600; Path=/; Secure"],
            "https://runalyze.com/login",
        );
        assert!(path.exists());

        let reloaded = SessionStore::open(&path, "runalyze.com").unwrap();
        let entries = reloaded.entries();
        assert_eq!(entries.len(), 2);
        let session = entries.iter().find(|c| c.name == "PHPSESSID").unwrap();
        assert_eq!(session.domain, "runalyze.com");
        assert!(session.http_only);
        assert_eq!(session.same_site.as_deref(), Some("Lax"));
        let remember = entries.iter().find(|c| c.name == "REMEMBERME").unwrap();
        assert!(remember.secure);
        assert!(remember.expires.is_some());
    }

    #[test]
    fn oversized_max_age_is_kept_without_expiry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookie.json");
        let store = SessionStore::open(&path, "runalyze.com").unwrap();
        set(
            &store,
            &["REMEMBERME=x; Path=/; Max-Age=99999999999999999999"],
            "https://runalyze.com/login",
        );
        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "REMEMBERME");
        assert_eq!(entries[0].expires, None);
        assert!(path.exists());
    }

    #[test]
    fn zero_max_age_removes_the_cookie() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("cookie.json"), "runalyze.com").unwrap();
        set(&store, &["PHPSESSID=abc; Path=/"], "https://runalyze.com/login");
        set(&store, &["PHPSESSID=; Path=/; Max-Age=0"], "https://runalyze.com/logout");
        assert!(store.entries().is_empty());
    }

    #[test]
    fn empty_domain_entries_reload_under_canonical_domain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookie.json");
        let json = serde_json::json!([
            {"name": "PHPSESSID", "value": "abc", "domain": "", "path": "/", "expires": null,
             "secure": false, "http_only": true}
        ]);
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let store = SessionStore::open(&path, "runalyze.com").unwrap();
        assert_eq!(store.entries()[0].domain, "runalyze.com");
        let header = store.cookies(&url("https://runalyze.com/databrowser")).unwrap();
        assert_eq!(header.to_str().unwrap(), "PHPSESSID=abc");

        // and the domain sticks after another save/load cycle
        store.save().unwrap();
        let again = SessionStore::open(&path, "runalyze.com").unwrap();
        assert_eq!(again.entries()[0].domain, "runalyze.com");
    }

    #[test]
    fn cookies_are_scoped_to_domain_and_scheme() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("c.json"), "runalyze.com").unwrap();
        set(&store, &["a=1; Domain=.runalyze.com; Secure", "b=2"], "https://runalyze.com/");
        assert_eq!(
            store.cookies(&url("https://runalyze.com/x")).unwrap().to_str().unwrap(),
            "a=1; b=2"
        );
        // Secure cookie withheld on plain http
        assert_eq!(
            store.cookies(&url("http://runalyze.com/x")).unwrap().to_str().unwrap(),
            "b=2"
        );
        assert!(store.cookies(&url("https://example.com/")).is_none());
    }

    #[test]
    fn expired_set_cookie_removes_entry() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("c.json"), "runalyze.com").unwrap();
        set(&store, &["PHPSESSID=abc; Path=/"], "https://runalyze.com/");
        set(&store, &["PHPSESSID=deleted; Path=/; Max-Age=0"], "https://runalyze.com/");
        assert!(store.entries().is_empty());
    }

    #[test]
    fn save_failure_keeps_cookies_in_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let store = SessionStore::open(&path, "runalyze.com").unwrap();
        // A directory where the file should be makes every write fail.
        std::fs::create_dir(&path).unwrap();
        set(&store, &["PHPSESSID=abc"], "https://runalyze.com/");
        assert_eq!(store.entries().len(), 1);
        assert!(store.save().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn cookie_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.json");
        let store = SessionStore::open(&path, "runalyze.com").unwrap();
        set(&store, &["PHPSESSID=abc"], "https://runalyze.com/");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
