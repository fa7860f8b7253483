//! Configuration module for account-sync-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AccountSyncConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub backend: BackendConfig,
    pub sync: SyncSettings,
    pub schedule: ScheduleConfig,
}

/// Where the list-accounts and reconcile endpoints live.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub list_accounts_path: String,
    pub reconcile_path: String,
    pub tenant_query_param: String,
    pub request_timeout: Duration,
}

/// Batching and retry knobs of a sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub batch_delay: Duration,
    pub require_owner_ref: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_attempts: 2,
            retry_delay: Duration::from_secs(1),
            batch_delay: Duration::from_secs(2),
            require_owner_ref: true,
        }
    }
}

impl SyncSettings {
    /// Settings for tests: no real waiting.
    pub fn immediate() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Batch size actually used; zero would never make progress.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::fixed(self.max_attempts.max(1) - 1, self.retry_delay)
    }
}

/// Periodic silent syncs run by the binary.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub tenants: Vec<String>,
    pub interval: Duration,
    pub service_token: Option<Secret<String>>,
}

impl ScheduleConfig {
    pub fn is_enabled(&self) -> bool {
        !self.tenants.is_empty() && self.service_token.is_some() && !self.interval.is_zero()
    }
}

impl AccountSyncConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SyncSettings::default();

        let base_url = lookup("BACKEND_URL")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::ConfigError(anyhow::anyhow!("BACKEND_URL is required")))?;

        Ok(Self {
            common,
            service_name: lookup("SERVICE_NAME")
                .unwrap_or_else(|| "account-sync-service".to_string()),
            service_version: lookup("SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otlp_endpoint: lookup("OTLP_ENDPOINT").filter(|s| !s.is_empty()),
            backend: BackendConfig {
                base_url,
                list_accounts_path: lookup("LIST_ACCOUNTS_PATH")
                    .unwrap_or_else(|| "/api/pluggy/accounts".to_string()),
                reconcile_path: lookup("RECONCILE_PATH")
                    .unwrap_or_else(|| "/api/pluggy/transactions/sync".to_string()),
                tenant_query_param: lookup("TENANT_QUERY_PARAM")
                    .unwrap_or_else(|| "company_id".to_string()),
                request_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "BACKEND_TIMEOUT_SECS",
                    30u64,
                )?),
            },
            sync: SyncSettings {
                batch_size: parse_or(&lookup, "SYNC_BATCH_SIZE", defaults.batch_size)?,
                max_attempts: parse_or(&lookup, "SYNC_MAX_ATTEMPTS", defaults.max_attempts)?,
                retry_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "SYNC_RETRY_DELAY_MS",
                    defaults.retry_delay.as_millis() as u64,
                )?),
                batch_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "SYNC_BATCH_DELAY_MS",
                    defaults.batch_delay.as_millis() as u64,
                )?),
                require_owner_ref: parse_or(
                    &lookup,
                    "SYNC_REQUIRE_OWNER_REF",
                    defaults.require_owner_ref,
                )?,
            },
            schedule: ScheduleConfig {
                tenants: lookup("SCHEDULED_TENANTS")
                    .map(|s| {
                        s.split(',')
                            .map(str::trim)
                            .filter(|t| !t.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                interval: Duration::from_secs(parse_or(&lookup, "SCHEDULE_INTERVAL_SECS", 3600u64)?),
                service_token: lookup("SERVICE_TOKEN")
                    .filter(|s| !s.is_empty())
                    .map(Secret::new),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: {}", key, e))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AccountSyncConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AccountSyncConfig::from_lookup(core_config::Config::default(), |key| {
            vars.get(key).cloned()
        })
    }

    #[test]
    fn test_defaults_match_reference_behaviour() {
        let config = load(&[("BACKEND_URL", "http://backend:3000")]).unwrap();

        assert_eq!(config.sync, SyncSettings::default());
        assert_eq!(config.sync.batch_size, 5);
        assert_eq!(config.sync.max_attempts, 2);
        assert_eq!(config.sync.retry_delay, Duration::from_secs(1));
        assert_eq!(config.sync.batch_delay, Duration::from_secs(2));
        assert_eq!(config.backend.tenant_query_param, "company_id");
        assert!(!config.schedule.is_enabled());
    }

    #[test]
    fn test_backend_url_required() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_overrides_and_schedule() {
        let config = load(&[
            ("BACKEND_URL", "http://backend:3000"),
            ("SYNC_BATCH_SIZE", "10"),
            ("SYNC_MAX_ATTEMPTS", "3"),
            ("SYNC_RETRY_DELAY_MS", "250"),
            ("SYNC_REQUIRE_OWNER_REF", "false"),
            ("SCHEDULED_TENANTS", "T1, T2,,"),
            ("SERVICE_TOKEN", "svc-token"),
        ])
        .unwrap();

        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.sync.retry_config().max_retries, 2);
        assert_eq!(config.sync.retry_delay, Duration::from_millis(250));
        assert!(!config.sync.require_owner_ref);
        assert_eq!(config.schedule.tenants, vec!["T1", "T2"]);
        assert!(config.schedule.is_enabled());
        assert_eq!(
            config.schedule.service_token.unwrap().expose_secret(),
            "svc-token"
        );
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = load(&[
            ("BACKEND_URL", "http://backend:3000"),
            ("SYNC_BATCH_SIZE", "five"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("SYNC_BATCH_SIZE"));
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let settings = SyncSettings {
            batch_size: 0,
            max_attempts: 0,
            ..SyncSettings::immediate()
        };
        assert_eq!(settings.effective_batch_size(), 1);
        assert_eq!(settings.retry_config().total_attempts(), 1);
    }
}
