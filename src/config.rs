//! Producer configuration.
//!
//! # Security Note
//!
//! This struct implements a custom Debug that redacts the auth parameters
//! and truststore password to prevent accidental leakage to logs.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CdcError, Result};

/// Default watcher poll cadence over the CDC directory.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;

/// Cooldown between publish retries in the delivery loop.
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(10);

/// Client-side timeout applied to each send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Commit-log CDC producer configuration.
#[derive(Clone)]
pub struct ProducerConfig {
    /// Directory the database writes CDC commit-log segments into
    pub cdc_dir: PathBuf,
    /// Working root holding the `archives/` and `errors/` subdirectories
    pub cdc_working_dir: PathBuf,
    /// Watcher poll cadence in milliseconds
    pub cdc_dir_poll_interval_ms: u64,
    /// Recycle errored segments back into the CDC directory on each detector tick
    pub error_commitlog_reprocess_enabled: bool,
    /// Tail the `<segmentId>_cdc.idx` sidecar files instead of waiting for
    /// closed `.log` segments (database near-real-time CDC mode)
    pub near_real_time_cdc: bool,
    /// Topic namespace prepended to `<keyspace>.<table>`
    pub topic_prefix: String,
    /// Bus endpoint, e.g. `pulsar://localhost:6650` or `pulsar+ssl://…`
    pub pulsar_service_url: String,
    /// Auth plugin name understood by the bus
    pub pulsar_auth_plugin_class_name: Option<String>,
    /// Auth plugin parameters (redacted from Debug)
    pub pulsar_auth_params: Option<String>,
    /// Path to the TLS trust certificate chain
    pub ssl_keystore_path: Option<PathBuf>,
    /// Truststore password (redacted from Debug); accepted for parity with
    /// JVM deployments, unused by the rustls-backed client
    pub ssl_truststore_password: Option<String>,
    /// Truststore type; accepted for parity, unused by the rustls-backed client
    pub ssl_truststore_type: Option<String>,
    /// Skip TLS certificate validation
    pub ssl_allow_insecure_connection: bool,
    /// Verify the broker hostname against its certificate
    pub ssl_hostname_verification_enable: bool,
    /// TLS provider name; accepted for parity, unused by the rustls-backed client
    pub ssl_provider: Option<String>,
    /// Comma-separated cipher suite list; accepted for parity
    pub ssl_cipher_suites: Option<String>,
    /// Comma-separated protocol list; accepted for parity
    pub ssl_enabled_protocols: Option<String>,
    /// Cooldown between publish retries
    pub retry_cooldown: Duration,
    /// Client-side per-send timeout
    pub send_timeout: Duration,
}

impl std::fmt::Debug for ProducerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerConfig")
            .field("cdc_dir", &self.cdc_dir)
            .field("cdc_working_dir", &self.cdc_working_dir)
            .field("cdc_dir_poll_interval_ms", &self.cdc_dir_poll_interval_ms)
            .field(
                "error_commitlog_reprocess_enabled",
                &self.error_commitlog_reprocess_enabled,
            )
            .field("near_real_time_cdc", &self.near_real_time_cdc)
            .field("topic_prefix", &self.topic_prefix)
            .field("pulsar_service_url", &self.pulsar_service_url)
            .field(
                "pulsar_auth_plugin_class_name",
                &self.pulsar_auth_plugin_class_name,
            )
            .field(
                "pulsar_auth_params",
                &self.pulsar_auth_params.as_ref().map(|_| "[REDACTED]"),
            )
            .field("ssl_keystore_path", &self.ssl_keystore_path)
            .field(
                "ssl_truststore_password",
                &self.ssl_truststore_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("ssl_truststore_type", &self.ssl_truststore_type)
            .field(
                "ssl_allow_insecure_connection",
                &self.ssl_allow_insecure_connection,
            )
            .field(
                "ssl_hostname_verification_enable",
                &self.ssl_hostname_verification_enable,
            )
            .field("ssl_provider", &self.ssl_provider)
            .field("ssl_cipher_suites", &self.ssl_cipher_suites)
            .field("ssl_enabled_protocols", &self.ssl_enabled_protocols)
            .field("retry_cooldown", &self.retry_cooldown)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            cdc_dir: PathBuf::from("cdc_raw"),
            cdc_working_dir: PathBuf::from("cdc"),
            cdc_dir_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            error_commitlog_reprocess_enabled: false,
            near_real_time_cdc: false,
            topic_prefix: "events-".to_string(),
            pulsar_service_url: "pulsar://localhost:6650".to_string(),
            pulsar_auth_plugin_class_name: None,
            pulsar_auth_params: None,
            ssl_keystore_path: None,
            ssl_truststore_password: None,
            ssl_truststore_type: None,
            ssl_allow_insecure_connection: false,
            ssl_hostname_verification_enable: true,
            ssl_provider: None,
            ssl_cipher_suites: None,
            ssl_enabled_protocols: None,
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl ProducerConfig {
    pub fn new(cdc_dir: impl Into<PathBuf>, cdc_working_dir: impl Into<PathBuf>) -> Self {
        Self {
            cdc_dir: cdc_dir.into(),
            cdc_working_dir: cdc_working_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.cdc_dir_poll_interval_ms = millis;
        self
    }

    pub fn with_error_reprocess(mut self, enabled: bool) -> Self {
        self.error_commitlog_reprocess_enabled = enabled;
        self
    }

    pub fn with_near_real_time_cdc(mut self, enabled: bool) -> Self {
        self.near_real_time_cdc = enabled;
        self
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn with_pulsar_service_url(mut self, url: impl Into<String>) -> Self {
        self.pulsar_service_url = url.into();
        self
    }

    pub fn with_auth(
        mut self,
        plugin_class_name: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        self.pulsar_auth_plugin_class_name = Some(plugin_class_name.into());
        self.pulsar_auth_params = Some(params.into());
        self
    }

    pub fn with_ssl_keystore_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ssl_keystore_path = Some(path.into());
        self
    }

    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = cooldown;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Directory errored segments are parked in.
    pub fn error_dir(&self) -> PathBuf {
        self.cdc_working_dir.join(crate::transfer::ERROR_FOLDER)
    }

    /// Directory successfully consumed segments are archived in.
    pub fn archive_dir(&self) -> PathBuf {
        self.cdc_working_dir.join(crate::transfer::ARCHIVE_FOLDER)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cdc_dir.as_os_str().is_empty() {
            return Err(CdcError::config("cdc_dir must not be empty"));
        }
        if self.cdc_working_dir.as_os_str().is_empty() {
            return Err(CdcError::config("cdc_working_dir must not be empty"));
        }
        if self.cdc_dir_poll_interval_ms == 0 {
            return Err(CdcError::config("cdc_dir_poll_interval_ms must be > 0"));
        }
        if self.pulsar_service_url.is_empty() {
            return Err(CdcError::config("pulsar_service_url must not be empty"));
        }
        if self.pulsar_auth_params.is_some() && self.pulsar_auth_plugin_class_name.is_none() {
            return Err(CdcError::config(
                "pulsar_auth_params set without pulsar_auth_plugin_class_name",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProducerConfig::default();
        assert_eq!(config.retry_cooldown, Duration::from_secs(10));
        assert_eq!(config.send_timeout, Duration::from_secs(15));
        assert!(!config.near_real_time_cdc);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = ProducerConfig::new("/var/lib/db/cdc_raw", "/var/lib/cdc")
            .with_poll_interval_ms(50)
            .with_topic_prefix("prefix-")
            .with_near_real_time_cdc(true)
            .with_error_reprocess(true);

        assert_eq!(config.cdc_dir, PathBuf::from("/var/lib/db/cdc_raw"));
        assert_eq!(config.cdc_dir_poll_interval_ms, 50);
        assert_eq!(config.topic_prefix, "prefix-");
        assert!(config.near_real_time_cdc);
        assert!(config.error_commitlog_reprocess_enabled);
        assert_eq!(config.archive_dir(), PathBuf::from("/var/lib/cdc/archives"));
        assert_eq!(config.error_dir(), PathBuf::from("/var/lib/cdc/errors"));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let config = ProducerConfig::default().with_poll_interval_ms(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_auth_params_without_plugin() {
        let mut config = ProducerConfig::default();
        config.pulsar_auth_params = Some("token:abc".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = ProducerConfig::default()
            .with_auth("org.apache.pulsar.client.impl.auth.AuthenticationToken", "token:s3cr3t");
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("[REDACTED]"));
    }
}
