use std::{net::SocketAddr, num::NonZeroU32};

use envconfig::Envconfig;
use tracing::Level;

use crate::limiters::window::WindowLimits;
use crate::router::SheetNames;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    // Rows are kept in memory when unset
    pub database_url: Option<String>,

    #[envconfig(default = "10")]
    pub max_pg_connections: u32,

    // Rate-limit counters are kept in process when unset
    pub redis_url: Option<String>,
    pub redis_key_prefix: Option<String>,

    #[envconfig(default = "Page1")]
    pub rsvp_sheet_name: String,

    #[envconfig(default = "Payments")]
    pub payment_sheet_name: String,

    #[envconfig(default = "60")]
    pub rate_limit_window_secs: u64,

    #[envconfig(default = "50")]
    pub rsvp_rate_limit: u64,

    #[envconfig(default = "20")]
    pub payment_rate_limit: u64,

    #[envconfig(default = "false")]
    pub client_limit_enabled: bool,

    #[envconfig(default = "1")]
    pub client_per_second_limit: NonZeroU32,

    #[envconfig(default = "10")]
    pub client_burst_limit: NonZeroU32,

    #[envconfig(default = "./slips")]
    pub slip_storage_dir: String,

    #[envconfig(default = "payment-slips")]
    pub slip_folder: String,

    #[envconfig(default = "http://127.0.0.1:3000/slips")]
    pub public_base_url: String,

    #[envconfig(default = "16777216")]
    pub max_body_bytes: usize,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    pub otel_url: Option<String>,

    #[envconfig(default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(default = "intake")]
    pub otel_service_name: String,

    #[envconfig(default = "info")]
    pub log_level: Level,
}

impl Config {
    pub fn window_limits(&self) -> WindowLimits {
        WindowLimits {
            window_secs: self.rate_limit_window_secs,
            rsvp: self.rsvp_rate_limit,
            payment: self.payment_rate_limit,
        }
    }

    pub fn sheet_names(&self) -> SheetNames {
        SheetNames {
            rsvp: self.rsvp_sheet_name.clone(),
            payment: self.payment_sheet_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).expect("failed to load defaults");

        assert_eq!(config.address.to_string(), "127.0.0.1:3000");
        assert!(config.database_url.is_none());
        assert!(config.redis_url.is_none());
        assert_eq!(config.window_limits(), WindowLimits::default());
        assert_eq!(config.sheet_names(), SheetNames::default());
        assert!(!config.client_limit_enabled);
        assert_eq!(config.max_body_bytes, 16 * 1024 * 1024);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn overrides() {
        let env = HashMap::from([
            ("RSVP_RATE_LIMIT".to_string(), "5".to_string()),
            ("PAYMENT_SHEET_NAME".to_string(), "Gifts".to_string()),
            ("REDIS_URL".to_string(), "redis://localhost:6379/".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).expect("failed to load config");

        assert_eq!(config.window_limits().rsvp, 5);
        assert_eq!(config.sheet_names().payment, "Gifts");
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379/"));
    }
}
