use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::errors::ConfigError;

pub const DEFAULT_CLUSTER: &str = "default";
pub const DEFAULT_MAX_REQUEST_RETRY: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_CONN_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_INACTIVE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUEUE_PROCESS_DELAY_SECS: u64 = 2;
pub const DEFAULT_MISSING_ENTRY_SENTINEL: &str = "does not exist";

/// Who hears about the two chains a missing naming entry spawns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CascadeCallback {
    /// Both the create chain and the re-issued action report to the caller.
    #[default]
    FanOut,
    /// Only the re-issued action reports; the create outcome is logged.
    Merged,
}

impl FromStr for CascadeCallback {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fan-out" | "fanout" => Ok(CascadeCallback::FanOut),
            "merged" => Ok(CascadeCallback::Merged),
            other => Err(ConfigError::UnknownCascadeMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bridge_base_url: String,
    pub cluster: String,
    pub max_request_retry: u32,
    pub register_retry_delay: Duration,
    pub register_conn_timeout: Duration,
    pub register_inactive_timeout: Duration,
    /// Used both to re-check a busy instance and to delay the re-issue after a cascade.
    pub queue_process_delay: Duration,
    pub missing_entry_sentinel: String,
    pub dedup_in_flight: bool,
    pub cascade_callback: CascadeCallback,
}

impl BridgeConfig {
    pub fn new(bridge_base_url: impl Into<String>) -> Self {
        Self {
            bridge_base_url: bridge_base_url.into(),
            cluster: DEFAULT_CLUSTER.to_string(),
            max_request_retry: DEFAULT_MAX_REQUEST_RETRY,
            register_retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            register_conn_timeout: Duration::from_secs(DEFAULT_CONN_TIMEOUT_SECS),
            register_inactive_timeout: Duration::from_secs(DEFAULT_INACTIVE_TIMEOUT_SECS),
            queue_process_delay: Duration::from_secs(DEFAULT_QUEUE_PROCESS_DELAY_SECS),
            missing_entry_sentinel: DEFAULT_MISSING_ENTRY_SENTINEL.to_string(),
            dedup_in_flight: true,
            cascade_callback: CascadeCallback::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBridgeUrl {
            url: self.bridge_base_url.clone(),
            reason: reason.to_string(),
        };

        let url = Url::parse(&self.bridge_base_url).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host"));
        }

        if self.register_conn_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("register_conn_timeout"));
        }
        if self.register_inactive_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("register_inactive_timeout"));
        }
        Ok(())
    }
}

/// Command line / environment surface for [`BridgeConfig`]. Durations are in seconds.
#[derive(Debug, Clone, clap::Args)]
pub struct BridgeArgs {
    /// Base URL of the naming bridge API
    #[arg(long, env = "BNSREG_BRIDGE")]
    pub bridge: String,

    #[arg(long, env = "BNSREG_CLUSTER", default_value = DEFAULT_CLUSTER)]
    pub cluster: String,

    #[arg(long, env = "BNSREG_MAX_REQUEST_RETRY", default_value_t = DEFAULT_MAX_REQUEST_RETRY)]
    pub max_request_retry: u32,

    #[arg(long, env = "BNSREG_REGISTER_RETRY_DELAY", default_value_t = DEFAULT_RETRY_DELAY_SECS)]
    pub register_retry_delay: u64,

    #[arg(long, env = "BNSREG_REGISTER_CONN_TIMEOUT", default_value_t = DEFAULT_CONN_TIMEOUT_SECS)]
    pub register_conn_timeout: u64,

    #[arg(long, env = "BNSREG_REGISTER_INACTIVE_TIMEOUT", default_value_t = DEFAULT_INACTIVE_TIMEOUT_SECS)]
    pub register_inactive_timeout: u64,

    #[arg(long, env = "BNSREG_QUEUE_PROCESS_DELAY", default_value_t = DEFAULT_QUEUE_PROCESS_DELAY_SECS)]
    pub queue_process_delay: u64,

    #[arg(long, env = "BNSREG_MISSING_ENTRY_SENTINEL", default_value = DEFAULT_MISSING_ENTRY_SENTINEL)]
    pub missing_entry_sentinel: String,

    /// Keep at most one bridge request in flight per instance
    #[arg(long, env = "BNSREG_DEDUP_IN_FLIGHT", default_value_t = true, action = clap::ArgAction::Set)]
    pub dedup_in_flight: bool,

    /// fan-out or merged
    #[arg(long, env = "BNSREG_CASCADE_CALLBACK", default_value = "fan-out")]
    pub cascade_callback: String,
}

impl BridgeArgs {
    pub fn into_config(self) -> Result<BridgeConfig, ConfigError> {
        let config = BridgeConfig {
            bridge_base_url: self.bridge,
            cluster: self.cluster,
            max_request_retry: self.max_request_retry,
            register_retry_delay: Duration::from_secs(self.register_retry_delay),
            register_conn_timeout: Duration::from_secs(self.register_conn_timeout),
            register_inactive_timeout: Duration::from_secs(self.register_inactive_timeout),
            queue_process_delay: Duration::from_secs(self.queue_process_delay),
            missing_entry_sentinel: self.missing_entry_sentinel,
            dedup_in_flight: self.dedup_in_flight,
            cascade_callback: self.cascade_callback.parse()?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        bridge: BridgeArgs,
    }

    #[test]
    fn defaults_apply_when_only_bridge_is_given() {
        let cli = TestCli::try_parse_from(["bnsreg", "--bridge", "http://bridge.local:8080"]).unwrap();
        let config = cli.bridge.into_config().unwrap();

        assert_eq!(config.cluster, DEFAULT_CLUSTER);
        assert_eq!(config.max_request_retry, DEFAULT_MAX_REQUEST_RETRY);
        assert_eq!(config.register_retry_delay, Duration::from_secs(5));
        assert_eq!(config.queue_process_delay, Duration::from_secs(2));
        assert!(config.dedup_in_flight);
        assert_eq!(config.cascade_callback, CascadeCallback::FanOut);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "bnsreg",
            "--bridge",
            "https://bridge.local",
            "--max-request-retry",
            "0",
            "--dedup-in-flight",
            "false",
            "--cascade-callback",
            "merged",
        ])
        .unwrap();
        let config = cli.bridge.into_config().unwrap();

        assert_eq!(config.max_request_retry, 0);
        assert!(!config.dedup_in_flight);
        assert_eq!(config.cascade_callback, CascadeCallback::Merged);
    }

    #[test]
    fn rejects_bad_bridge_urls() {
        assert!(matches!(
            BridgeConfig::new("not a url").validate(),
            Err(ConfigError::InvalidBridgeUrl { .. })
        ));
        assert!(matches!(
            BridgeConfig::new("ftp://bridge.local").validate(),
            Err(ConfigError::InvalidBridgeUrl { .. })
        ));
        assert!(BridgeConfig::new("http://bridge.local:8080/api").validate().is_ok());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut config = BridgeConfig::new("http://bridge.local");
        config.register_inactive_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroDuration("register_inactive_timeout"))));
    }

    #[test]
    fn rejects_unknown_cascade_mode() {
        assert!("twice".parse::<CascadeCallback>().is_err());
    }
}
