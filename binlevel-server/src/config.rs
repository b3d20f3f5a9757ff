use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use reqwest::{Client, Url};
use serde_json::{Map, Value};

use binlevel_core::memory::{MemoryRecords, MemoryTelemetry};
use binlevel_core::{SamplerOptions, StorePlugin};
use binlevel_provider_firebase::{
    self as firebase, Credentials, FirestoreSettings, RealtimeAuth, RealtimeSettings,
};

/// Records kept by the memory backend before the oldest are dropped.
const MEMORY_RECORD_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Backend {
    /// Realtime Database telemetry, Firestore records.
    Firebase,
    /// Process-local stores, optionally seeded from a JSON file. Records are
    /// not persisted and only the newest ones are kept; meant for local runs.
    Memory,
}

/// Process configuration, read from flags or the environment.
#[derive(Debug, Parser)]
#[command(
    name = "binlevel-server",
    version,
    about = "Samples bin distance sensors hourly and on demand, recording fill levels"
)]
pub(crate) struct Config {
    /// Port the HTTP triggers listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub(crate) port: u16,

    /// Storage backend for telemetry and records.
    #[arg(long, env = "BINLEVEL_BACKEND", value_enum, default_value_t = Backend::Firebase)]
    pub(crate) backend: Backend,

    /// Realtime Database root holding one key per bin.
    #[arg(long, env = "FIREBASE_DATABASE_URL", value_name = "URL")]
    pub(crate) database_url: Option<Url>,

    /// Base64-encoded service account JSON key; mints and refreshes access
    /// tokens for both databases.
    #[arg(long, env = "FIREBASE_SERVICE_ACCOUNT_KEY", hide_env_values = true)]
    pub(crate) service_account_key: Option<String>,

    /// Realtime Database secret or ID token; overrides the service account.
    #[arg(long, env = "FIREBASE_DATABASE_AUTH", hide_env_values = true)]
    pub(crate) database_auth: Option<String>,

    /// Firestore project id; defaults to the service account's project.
    #[arg(long, env = "FIRESTORE_PROJECT_ID", value_name = "PROJECT")]
    pub(crate) firestore_project: Option<String>,

    /// Pre-minted OAuth2 access token for Firestore; overrides the service account.
    #[arg(long, env = "FIRESTORE_ACCESS_TOKEN", hide_env_values = true)]
    pub(crate) firestore_token: Option<String>,

    /// Firestore API root, e.g. an emulator at `http://localhost:8080/v1`.
    #[arg(long, env = "FIRESTORE_BASE_URL", value_name = "URL")]
    pub(crate) firestore_base_url: Option<String>,

    /// JSON object of raw bin values loaded into the memory backend.
    #[arg(long, env = "BINLEVEL_MEMORY_SEED", value_name = "PATH")]
    pub(crate) memory_seed: Option<PathBuf>,

    /// Upper bound for each telemetry read, in seconds.
    #[arg(long, env = "BINLEVEL_READ_TIMEOUT_SECS", default_value_t = 10)]
    pub(crate) read_timeout_secs: u64,

    /// Upper bound for each record write, in seconds.
    #[arg(long, env = "BINLEVEL_WRITE_TIMEOUT_SECS", default_value_t = 10)]
    pub(crate) write_timeout_secs: u64,

    /// Minute past each hour at which the scheduled pass fires.
    #[arg(
        long,
        env = "BINLEVEL_SCHEDULE_MINUTE",
        default_value_t = 0,
        value_parser = clap::value_parser!(u32).range(0..60)
    )]
    pub(crate) schedule_minute: u32,

    /// Run at most one sampling pass at a time.
    #[arg(long, env = "BINLEVEL_EXCLUSIVE_PASSES")]
    pub(crate) exclusive_passes: bool,

    /// Only serve the manual trigger; no hourly passes.
    #[arg(long)]
    pub(crate) no_schedule: bool,
}

impl Config {
    pub(crate) fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        }
    }

    /// HTTP client shared by the network stores.
    pub(crate) fn http_client(&self) -> Result<Client> {
        let options = self.sampler_options();
        let client = Client::builder()
            .user_agent("binlevel/0.1")
            .timeout(options.read_timeout.max(options.write_timeout))
            .build()?;
        Ok(client)
    }

    /// Build the store plugin selected by `backend`.
    pub(crate) fn plugin(&self) -> Result<StorePlugin> {
        match self.backend {
            Backend::Firebase => self.firebase_plugin(),
            Backend::Memory => self.memory_plugin(),
        }
    }

    fn firebase_plugin(&self) -> Result<StorePlugin> {
        let database_url = self
            .database_url
            .clone()
            .context("FIREBASE_DATABASE_URL is required for the firebase backend")?;
        let service_account = self
            .service_account_key
            .as_deref()
            .map(Credentials::from_service_account_key)
            .transpose()
            .context("loading FIREBASE_SERVICE_ACCOUNT_KEY")?;

        let project_id = self
            .firestore_project
            .clone()
            .or_else(|| {
                service_account
                    .as_ref()
                    .and_then(Credentials::project_id)
                    .map(str::to_owned)
            })
            .context("FIRESTORE_PROJECT_ID is required for the firebase backend")?;
        let firestore_credentials = match (&self.firestore_token, &service_account) {
            (Some(token), _) => Credentials::Static(token.clone()),
            (None, Some(account)) => account.clone(),
            (None, None) => bail!(
                "FIRESTORE_ACCESS_TOKEN or FIREBASE_SERVICE_ACCOUNT_KEY is required \
                 for the firebase backend"
            ),
        };
        let realtime_auth = match (&self.database_auth, service_account) {
            (Some(secret), _) => Some(RealtimeAuth::Secret(secret.clone())),
            (None, Some(account)) => Some(RealtimeAuth::AccessToken(account)),
            (None, None) => None,
        };

        let realtime = RealtimeSettings {
            database_url,
            auth: realtime_auth,
        };
        let mut firestore = FirestoreSettings::new(project_id, firestore_credentials);
        if let Some(base_url) = &self.firestore_base_url {
            firestore.base_url.clone_from(base_url);
        }

        Ok(firebase::plugin(self.http_client()?, realtime, firestore))
    }

    fn memory_plugin(&self) -> Result<StorePlugin> {
        let telemetry = match &self.memory_seed {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("reading memory seed {}", path.display()))?;
                let bins: Map<String, Value> = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing memory seed {}", path.display()))?;
                MemoryTelemetry::with_bins(bins)
            }
            None => MemoryTelemetry::new(),
        };

        Ok(StorePlugin {
            name: "memory",
            telemetry: Arc::new(telemetry),
            records: Arc::new(MemoryRecords::bounded(MEMORY_RECORD_LIMIT)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("binlevel-server").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn defaults_match_hourly_service() {
        let config = parse(&["--backend", "memory"]);
        assert_eq!(config.schedule_minute, 0);
        assert!(!config.exclusive_passes);
        assert_eq!(config.sampler_options().read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn schedule_minute_must_be_within_hour() {
        let parsed = Config::try_parse_from(["binlevel-server", "--schedule-minute", "60"]);
        assert!(parsed.is_err());
    }

    // Settings may also arrive through the environment; pin every store field.
    fn firebase_config(
        database_url: Option<&str>,
        project: Option<&str>,
        token: Option<&str>,
    ) -> Config {
        let mut config = parse(&["--backend", "firebase"]);
        config.database_url = database_url.map(|url| Url::parse(url).expect("valid url"));
        config.database_auth = None;
        config.service_account_key = None;
        config.firestore_project = project.map(str::to_owned);
        config.firestore_token = token.map(str::to_owned);
        config.firestore_base_url = None;
        config
    }

    fn plugin_error(config: &Config) -> String {
        let err = config.plugin().err().expect("missing settings");
        format!("{err:#}")
    }

    const DATABASE_URL: &str = "https://bins-default-rtdb.firebaseio.com/";

    #[test]
    fn firebase_backend_requires_store_settings() {
        let config = firebase_config(None, None, None);
        assert!(plugin_error(&config).contains("FIREBASE_DATABASE_URL"));
    }

    #[test]
    fn firebase_backend_requires_project() {
        let config = firebase_config(Some(DATABASE_URL), None, Some("token"));
        assert!(plugin_error(&config).contains("FIRESTORE_PROJECT_ID"));
    }

    #[test]
    fn firebase_backend_requires_credentials() {
        let config = firebase_config(Some(DATABASE_URL), Some("bins"), None);
        let message = plugin_error(&config);
        assert!(message.contains("FIRESTORE_ACCESS_TOKEN"));
        assert!(message.contains("FIREBASE_SERVICE_ACCOUNT_KEY"));
    }

    #[test]
    fn firebase_backend_rejects_malformed_service_account_key() {
        let mut config = firebase_config(Some(DATABASE_URL), Some("bins"), None);
        config.service_account_key = Some("not base64!".to_owned());
        let message = plugin_error(&config);
        assert!(message.contains("loading FIREBASE_SERVICE_ACCOUNT_KEY"));
        assert!(message.contains("base64"));
    }

    #[test]
    fn firebase_backend_builds_with_settings() {
        let config = firebase_config(Some(DATABASE_URL), Some("bins"), Some("token"));
        let plugin = config.plugin().expect("plugin");
        assert_eq!(plugin.name, "firebase");
    }

    #[test]
    fn service_account_key_is_read_from_flag() {
        let config = parse(&["--service-account-key", "a2V5"]);
        assert_eq!(config.service_account_key.as_deref(), Some("a2V5"));
    }

    #[test]
    fn memory_backend_without_seed_is_empty() {
        let plugin = parse(&["--backend", "memory"]).plugin().expect("plugin");
        assert_eq!(plugin.name, "memory");
    }
}
