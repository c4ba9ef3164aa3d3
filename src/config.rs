use std::sync::atomic::{AtomicU64, Ordering};

use validator::Validate;

#[derive(Deserialize, Debug, Validate)]
pub struct Config {
    database_url: String,
    api_host: Option<String>,
    api_port: Option<u16>,
    #[validate(length(min = 32))]
    session_private_key: String,
    redis_url: Option<String>,
    sentry_dsn: Option<String>,
    /// defaults to localhost, which shouldn't cause issues if you're using udp
    opentelemetry_endpoint: Option<String>,
    /// origin of the frontend, allowed to make credentialed CORS requests
    #[validate(url)]
    allowed_origin: Option<String>,
    /// earned points expire after this many days
    #[serde(default = "default_reward_expiry_days")]
    #[validate(range(min = 1))]
    reward_expiry_days: i64,
    /// the interval in seconds between reward expiry sweeps
    #[serde(default = "default_reward_sweep_interval")]
    reward_sweep_interval: AtomicU64,
    /// the interval in seconds between completing finished bookings
    #[serde(default = "default_booking_completion_interval")]
    booking_completion_interval: u64,
    /// creates this admin on startup when it doesn't exist yet
    admin_username: Option<String>,
    admin_password: Option<String>,
}

fn default_reward_expiry_days() -> i64 {
    365
}

fn default_reward_sweep_interval() -> AtomicU64 {
    AtomicU64::new(3600)
}

fn default_booking_completion_interval() -> u64 {
    300
}

lazy_static! {
    static ref CONFIG: Config = match envy::from_env::<Config>() {
        Ok(config) => {
            match config.validate() {
                Ok(()) => config,
                Err(e) => panic!("invalid environment variable: {}", e),
            }
        }
        Err(error) => panic!("Missing or incorrect environment variable: {}", error),
    };
}

impl Config {
    /// Load and validate the configuration, panics when it's invalid
    pub fn init() {
        lazy_static::initialize(&CONFIG);
    }

    pub fn database_url() -> &'static str {
        CONFIG.database_url.as_ref()
    }

    pub fn api_host() -> &'static str {
        match &CONFIG.api_host {
            Some(host) => host.as_ref(),
            None => "localhost",
        }
    }

    pub fn api_port() -> u16 {
        CONFIG.api_port.unwrap_or(8080)
    }

    pub fn session_private_key() -> &'static str {
        CONFIG.session_private_key.as_ref()
    }

    pub fn redis_url() -> Option<&'static str> {
        CONFIG.redis_url.as_ref().map(|url| url.as_ref())
    }

    pub fn sentry_dsn() -> Option<&'static str> {
        CONFIG.sentry_dsn.as_ref().map(|dsn| dsn.as_ref())
    }

    pub fn opentelemetry_endpoint() -> &'static str {
        match &CONFIG.opentelemetry_endpoint {
            Some(endpoint) => endpoint.as_ref(),
            None => "127.0.0.1:6831",
        }
    }

    pub fn allowed_origin() -> Option<&'static str> {
        CONFIG.allowed_origin.as_ref().map(|origin| origin.as_ref())
    }

    pub fn reward_expiry_days() -> i64 {
        CONFIG.reward_expiry_days
    }

    pub fn reward_sweep_interval() -> u64 {
        CONFIG.reward_sweep_interval.load(Ordering::SeqCst)
    }

    pub fn set_reward_sweep_interval(interval: u64) {
        CONFIG
            .reward_sweep_interval
            .store(interval, Ordering::SeqCst)
    }

    pub fn booking_completion_interval() -> u64 {
        CONFIG.booking_completion_interval
    }

    /// returns the bootstrap admin credentials, only when both are configured
    pub fn admin_credentials() -> Option<(&'static str, &'static str)> {
        match (&CONFIG.admin_username, &CONFIG.admin_password) {
            (Some(username), Some(password)) => Some((username.as_ref(), password.as_ref())),
            _ => None,
        }
    }
}
