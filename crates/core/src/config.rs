use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Profiled lookup against an arbitrary source: tries `{PROFILE}_{KEY}` first,
/// falls back to `{KEY}`.
struct Profiled<'a, F> {
    profile: &'a str,
    lookup: F,
}

impl<F> Profiled<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = (self.lookup)(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        (self.lookup)(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.opt(key).map(|v| v.to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }
}

/// Default root of the user record files.
pub const DEFAULT_DATA_DIR: &str = "/data/users";
/// Default record file extension (without the dot).
pub const DEFAULT_EXTENSION: &str = "json";
/// Default quiet period before a burst of file events triggers a reload.
pub const DEFAULT_RELOAD_DEBOUNCE_MS: u64 = 250;
/// Longest accepted debounce window; larger settings are clamped to it.
pub const MAX_RELOAD_DEBOUNCE_MS: u64 = 60_000;

// ── Duplicate usernames ───────────────────────────────────────

/// What to do when two records in one load share a username.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateUsernamePolicy {
    /// Keep every record; username lookups resolve to the lowest id.
    #[default]
    First,
    /// Fail the load.
    Reject,
}

impl FromStr for DuplicateUsernamePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown duplicate-username policy '{}'", other)),
        }
    }
}

impl fmt::Display for DuplicateUsernamePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

// ── Directory config ──────────────────────────────────────────

/// Where user records live and how the directory reloads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Root directory holding the record files.
    pub data_dir: PathBuf,
    /// Descend into subdirectories of `data_dir`.
    pub recursive: bool,
    /// Recognized record file extension, without the leading dot.
    pub extension: String,
    /// Quiet period after the last file event before a reload runs.
    #[serde(with = "duration_ms")]
    pub reload_debounce: Duration,
    pub duplicate_usernames: DuplicateUsernamePolicy,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

impl DirectoryConfig {
    /// Defaults for everything except the root directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile: String::new(),
            data_dir: data_dir.into(),
            recursive: false,
            extension: DEFAULT_EXTENSION.to_string(),
            reload_debounce: Duration::from_millis(DEFAULT_RELOAD_DEBOUNCE_MS),
            duplicate_usernames: DuplicateUsernamePolicy::default(),
        }
    }

    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `USERDIR_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("USERDIR_PROFILE", "").to_uppercase();
        Self::from_lookup(&profile, env_opt)
    }

    /// Build config for a profile from any key/value source.
    pub fn from_lookup<F>(profile: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = profile.to_uppercase();
        let p = Profiled {
            profile: &profile,
            lookup,
        };

        let duplicate_usernames = match p.opt("USERS_DUPLICATE_USERNAMES") {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "falling back to default duplicate-username policy");
                DuplicateUsernamePolicy::default()
            }),
            None => DuplicateUsernamePolicy::default(),
        };

        let extension = p.or("USERS_FILE_EXTENSION", DEFAULT_EXTENSION);

        // A bare DATA_DIR means the users live in its `users` subdirectory.
        let data_dir = match (p.opt("USERS_DATA_DIR"), p.opt("DATA_DIR")) {
            (Some(dir), _) => PathBuf::from(dir),
            (None, Some(base)) => PathBuf::from(base).join("users"),
            (None, None) => PathBuf::from(DEFAULT_DATA_DIR),
        };

        Self {
            profile: profile.clone(),
            data_dir,
            recursive: p.bool("USERS_RECURSIVE", false),
            extension: extension.trim_start_matches('.').to_string(),
            reload_debounce: clamp_debounce(Duration::from_millis(
                p.u64("USERS_RELOAD_DEBOUNCE_MS", DEFAULT_RELOAD_DEBOUNCE_MS),
            )),
            duplicate_usernames,
        }
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_reload_debounce(mut self, debounce: Duration) -> Self {
        self.reload_debounce = clamp_debounce(debounce);
        self
    }

    pub fn with_duplicate_usernames(mut self, policy: DuplicateUsernamePolicy) -> Self {
        self.duplicate_usernames = policy;
        self
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  data_dir:    {}", self.data_dir.display());
        tracing::info!("  recursive:   {}", self.recursive);
        tracing::info!("  extension:   .{}", self.extension);
        tracing::info!("  debounce:    {}ms", self.reload_debounce.as_millis());
        tracing::info!("  duplicates:  usernames={}", self.duplicate_usernames);
    }
}

/// Cap a debounce window at [`MAX_RELOAD_DEBOUNCE_MS`].
pub fn clamp_debounce(debounce: Duration) -> Duration {
    let max = Duration::from_millis(MAX_RELOAD_DEBOUNCE_MS);
    if debounce > max {
        tracing::warn!(
            requested_ms = debounce.as_millis() as u64,
            max_ms = MAX_RELOAD_DEBOUNCE_MS,
            "reload debounce too long, clamping"
        );
        return max;
    }
    debounce
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
