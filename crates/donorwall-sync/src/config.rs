use std::path::PathBuf;
use std::time::Duration;

use donorwall_storage::{SnapshotConfig, SnapshotLayout};
use donorwall_upstream::UpstreamConfig;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub upstream: UpstreamConfig,
    pub storage_root: PathBuf,
    pub bucket: String,
    pub snapshots: SnapshotConfig,
    pub sync_interval: Duration,
    pub misfire_grace: Duration,
    pub scheduler_enabled: bool,
    pub environment: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; absent or unparseable
    /// values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let upstream_defaults = UpstreamConfig::default();
        let upstream = UpstreamConfig {
            base_url: var("GIVEBUTTER_API_URL").unwrap_or(upstream_defaults.base_url),
            api_key: var("GIVEBUTTER_API_KEY"),
            timeout: Duration::from_secs(number("UPSTREAM_TIMEOUT_SECS", 30).max(1)),
            per_page: number("UPSTREAM_PER_PAGE", 100).clamp(1, 1000) as u32,
            user_agent: upstream_defaults.user_agent,
        };

        let snapshot_defaults = SnapshotConfig::default();
        let layout = match var("SNAPSHOT_LAYOUT").as_deref().map(str::trim) {
            Some("canonical") | Some("production") => SnapshotLayout::Canonical {
                prefix: var("CANONICAL_PREFIX")
                    .unwrap_or_else(|| "donor-sync/production".to_string()),
            },
            _ => SnapshotLayout::Timestamped,
        };
        let snapshots = SnapshotConfig {
            prefix: var("SNAPSHOT_PREFIX").unwrap_or(snapshot_defaults.prefix),
            namespace: var("SNAPSHOT_NAMESPACE").unwrap_or(snapshot_defaults.namespace),
            layout,
        };

        Self {
            upstream,
            storage_root: var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./storage")),
            bucket: var("STORAGE_BUCKET").unwrap_or_else(|| "donor-wall-assets".to_string()),
            snapshots,
            sync_interval: Duration::from_secs(
                number("SYNC_INTERVAL_MINUTES", 15).max(1).saturating_mul(60),
            ),
            misfire_grace: Duration::from_secs(number("SYNC_MISFIRE_GRACE_SECS", 300)),
            scheduler_enabled: var("SYNC_SCHEDULER_ENABLED")
                .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes"))
                .unwrap_or(true),
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
        }
    }

    /// Directory standing in for the object-store bucket.
    pub fn bucket_root(&self) -> PathBuf {
        self.storage_root.join(&self.bucket)
    }

    /// Inbound request authentication is skipped only in development.
    pub fn auth_enforced(&self) -> bool {
        !self.environment.eq_ignore_ascii_case("development")
    }
}
