//! Worker configuration, read from `GB_*` environment variables.
//!
//! Every setting has a default. A value that is present but cannot be parsed is logged and replaced by the default,
//! so a typo never stops the worker from starting.
use std::{env, fmt::Display, str::FromStr, time::Duration};

use gb_common::helpers::{parse_boolean_flag, parse_percentage};
use group_buy_engine::{notifications::RetryPolicy, order_objects::OrderFlowConfig, VirtualCompletionPolicy};
use log::*;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/group_buy.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_SWEEP_BATCH_SIZE: i64 = 100;
const DEFAULT_UNPAID_TIMEOUT_MINS: i64 = 30;
const DEFAULT_VIRTUAL_LEAD_SECS: i64 = 300;
const DEFAULT_VIRTUAL_MIN_PERCENT: u8 = 50;
const DEFAULT_NOTIFY_INTERVAL_SECS: u64 = 30;
const DEFAULT_NOTIFY_BATCH_SIZE: i64 = 100;
const DEFAULT_NOTIFY_MAX_RETRIES: i64 = 3;
const DEFAULT_BASE_BACKOFF_SECS: u64 = 30;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 1800;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STALE_AFTER_SECS: u64 = 300;
const DEFAULT_LOCK_WAIT_MS: u64 = 3_000;
const DEFAULT_LOCK_LEASE_MS: u64 = 10_000;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub expiry: ExpiryConfig,
    pub notifications: NotificationConfig,
    pub order_flow: OrderFlowConfig,
    /// Buffer size of each in-process event channel
    pub event_buffer_size: usize,
}

#[derive(Clone, Debug)]
pub struct ExpiryConfig {
    pub interval: Duration,
    pub batch_size: i64,
    /// Unpaid trade orders older than this are timed out and their slots released.
    pub unpaid_timeout: chrono::Duration,
    /// `None` disables virtual completion.
    pub virtual_completion: Option<VirtualCompletionPolicy>,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub interval: Duration,
    pub batch_size: i64,
    pub retry_policy: RetryPolicy,
    pub http_timeout: Duration,
    /// Claimed tasks that have not been resolved within this time are returned to the queue.
    pub stale_after: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            expiry: ExpiryConfig::default(),
            notifications: NotificationConfig::default(),
            order_flow: OrderFlowConfig::default(),
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            unpaid_timeout: chrono::Duration::minutes(DEFAULT_UNPAID_TIMEOUT_MINS),
            virtual_completion: Some(VirtualCompletionPolicy {
                lead_time: chrono::Duration::seconds(DEFAULT_VIRTUAL_LEAD_SECS),
                min_complete_percent: DEFAULT_VIRTUAL_MIN_PERCENT,
            }),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_NOTIFY_INTERVAL_SECS),
            batch_size: DEFAULT_NOTIFY_BATCH_SIZE,
            retry_policy: RetryPolicy {
                base_delay: Duration::from_secs(DEFAULT_BASE_BACKOFF_SECS),
                max_delay: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
                max_attempts: DEFAULT_NOTIFY_MAX_RETRIES,
            },
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let database_url = lookup("GB_DATABASE_URL").unwrap_or_else(|| {
            info!("🪛️ GB_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = parse_var(&lookup, "GB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS).max(1);
        let expiry = ExpiryConfig::from_lookup(&lookup);
        let notifications = NotificationConfig::from_lookup(&lookup);
        let order_flow = OrderFlowConfig {
            lock_wait: Duration::from_millis(parse_var(&lookup, "GB_LOCK_WAIT_MS", DEFAULT_LOCK_WAIT_MS)),
            lock_lease: Duration::from_millis(parse_var(&lookup, "GB_LOCK_LEASE_MS", DEFAULT_LOCK_LEASE_MS)),
            ..Default::default()
        };
        let event_buffer_size = parse_var(&lookup, "GB_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE).max(1);
        Self { database_url, max_connections, expiry, notifications, order_flow, event_buffer_size }
    }
}

impl ExpiryConfig {
    fn from_lookup<F>(lookup: &F) -> Self
    where F: Fn(&str) -> Option<String> {
        let interval = Duration::from_secs(parse_var(lookup, "GB_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS));
        let batch_size = parse_var(lookup, "GB_SWEEP_BATCH_SIZE", DEFAULT_SWEEP_BATCH_SIZE).max(1);
        let unpaid_timeout = chrono::Duration::minutes(parse_var(
            lookup,
            "GB_UNPAID_TRADE_ORDER_TIMEOUT_MINS",
            DEFAULT_UNPAID_TIMEOUT_MINS,
        ));
        let enabled = parse_boolean_flag(lookup("GB_VIRTUAL_COMPLETION_ENABLED"), true);
        let virtual_completion = enabled.then(|| VirtualCompletionPolicy {
            lead_time: chrono::Duration::seconds(parse_var(
                lookup,
                "GB_VIRTUAL_COMPLETION_LEAD_SECS",
                DEFAULT_VIRTUAL_LEAD_SECS,
            )),
            min_complete_percent: parse_percentage(
                lookup("GB_VIRTUAL_COMPLETION_MIN_PERCENT").as_deref(),
                DEFAULT_VIRTUAL_MIN_PERCENT,
            ),
        });
        if virtual_completion.is_none() {
            info!("🪛️ Virtual completion is disabled. Expired VIRTUAL teams will fail like any other.");
        }
        Self { interval, batch_size, unpaid_timeout, virtual_completion }
    }
}

impl NotificationConfig {
    fn from_lookup<F>(lookup: &F) -> Self
    where F: Fn(&str) -> Option<String> {
        let interval = Duration::from_secs(parse_var(lookup, "GB_NOTIFY_INTERVAL_SECS", DEFAULT_NOTIFY_INTERVAL_SECS));
        let batch_size = parse_var(lookup, "GB_NOTIFY_BATCH_SIZE", DEFAULT_NOTIFY_BATCH_SIZE).max(1);
        let base_delay =
            Duration::from_secs(parse_var(lookup, "GB_NOTIFY_BASE_BACKOFF_SECS", DEFAULT_BASE_BACKOFF_SECS));
        let mut max_delay =
            Duration::from_secs(parse_var(lookup, "GB_NOTIFY_MAX_BACKOFF_SECS", DEFAULT_MAX_BACKOFF_SECS));
        if max_delay < base_delay {
            warn!(
                "🪛️ GB_NOTIFY_MAX_BACKOFF_SECS ({}s) is shorter than GB_NOTIFY_BASE_BACKOFF_SECS ({}s). Using the base \
                 backoff as the cap.",
                max_delay.as_secs(),
                base_delay.as_secs()
            );
            max_delay = base_delay;
        }
        let max_attempts = parse_var(lookup, "GB_NOTIFY_MAX_RETRIES", DEFAULT_NOTIFY_MAX_RETRIES).max(1);
        let http_timeout =
            Duration::from_secs(parse_var(lookup, "GB_NOTIFY_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS));
        let stale_after = Duration::from_secs(parse_var(lookup, "GB_NOTIFY_STALE_AFTER_SECS", DEFAULT_STALE_AFTER_SECS));
        Self {
            interval,
            batch_size,
            retry_policy: RetryPolicy { base_delay, max_delay, max_attempts },
            http_timeout,
            stale_after,
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match lookup(name) {
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.expiry.interval, Duration::from_secs(60));
        assert_eq!(config.expiry.batch_size, 100);
        assert_eq!(config.expiry.unpaid_timeout, chrono::Duration::minutes(30));
        let policy = config.expiry.virtual_completion.expect("virtual completion is on by default");
        assert_eq!(policy.lead_time, chrono::Duration::seconds(300));
        assert_eq!(policy.min_complete_percent, 50);
        assert_eq!(config.notifications.retry_policy, RetryPolicy::default());
        assert_eq!(config.notifications.http_timeout, Duration::from_secs(5));
        assert_eq!(config.notifications.stale_after, Duration::from_secs(300));
        assert_eq!(config.order_flow.lock_wait, Duration::from_millis(3_000));
        assert_eq!(config.order_flow.lock_lease, Duration::from_millis(10_000));
        assert_eq!(config.event_buffer_size, 25);
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("GB_DATABASE_URL", "sqlite://tmp/gb.db"),
            ("GB_SWEEP_INTERVAL_SECS", "15"),
            ("GB_UNPAID_TRADE_ORDER_TIMEOUT_MINS", "5"),
            ("GB_VIRTUAL_COMPLETION_MIN_PERCENT", "80%"),
            ("GB_NOTIFY_MAX_RETRIES", "5"),
            ("GB_NOTIFY_BASE_BACKOFF_SECS", "2"),
            ("GB_LOCK_WAIT_MS", "250"),
        ]);
        assert_eq!(config.database_url, "sqlite://tmp/gb.db");
        assert_eq!(config.expiry.interval, Duration::from_secs(15));
        assert_eq!(config.expiry.unpaid_timeout, chrono::Duration::minutes(5));
        assert_eq!(config.expiry.virtual_completion.map(|p| p.min_complete_percent), Some(80));
        assert_eq!(config.notifications.retry_policy.max_attempts, 5);
        assert_eq!(config.notifications.retry_policy.base_delay, Duration::from_secs(2));
        assert_eq!(config.order_flow.lock_wait, Duration::from_millis(250));
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("GB_MAX_CONNECTIONS", "lots"),
            ("GB_SWEEP_BATCH_SIZE", "-3"),
            ("GB_NOTIFY_MAX_RETRIES", "0"),
            ("GB_EVENT_BUFFER_SIZE", "1.5"),
        ]);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.expiry.batch_size, 1);
        assert_eq!(config.notifications.retry_policy.max_attempts, 1);
        assert_eq!(config.event_buffer_size, 25);
    }

    #[test]
    fn virtual_completion_can_be_disabled() {
        let config = config_from(&[("GB_VIRTUAL_COMPLETION_ENABLED", "false")]);
        assert!(config.expiry.virtual_completion.is_none());
    }

    #[test]
    fn backoff_cap_is_never_below_base() {
        let config = config_from(&[("GB_NOTIFY_BASE_BACKOFF_SECS", "600"), ("GB_NOTIFY_MAX_BACKOFF_SECS", "60")]);
        let policy = config.notifications.retry_policy;
        assert_eq!(policy.max_delay, Duration::from_secs(600));
        assert_eq!(policy.delay_for(3), Duration::from_secs(600));
    }
}
