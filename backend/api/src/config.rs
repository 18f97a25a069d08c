//! Application configuration loaded from environment variables.

use marketplace_core::FeeSchedule;

use crate::errors::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL (e.g. sqlite:./marketplace.db)
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Fee debited from a customer's wallet per posted project
    pub posting_fee: i64,
    /// Fee debited from a supplier's bid balance per bid
    pub bid_fee: i64,
    /// Optional endpoint every notification is forwarded to
    pub notify_webhook_url: Option<String>,
    /// Delivery attempts per notification before it is dropped
    pub notify_max_attempts: u32,
    /// Email of an admin account created at startup if missing
    pub bootstrap_admin_email: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            database_url: var("DATABASE_URL", "sqlite:./marketplace.db"),
            api_port: var("API_PORT", "3001")
                .parse()
                .map_err(|_| ApiError::Config("Invalid API_PORT".to_string()))?,
            posting_fee: var("POSTING_FEE", "0")
                .parse()
                .map_err(|_| ApiError::Config("Invalid POSTING_FEE".to_string()))?,
            bid_fee: var("BID_FEE", "0")
                .parse()
                .map_err(|_| ApiError::Config("Invalid BID_FEE".to_string()))?,
            notify_webhook_url: lookup("NOTIFY_WEBHOOK_URL").filter(|url| !url.trim().is_empty()),
            notify_max_attempts: var("NOTIFY_MAX_ATTEMPTS", "5")
                .parse()
                .map_err(|_| ApiError::Config("Invalid NOTIFY_MAX_ATTEMPTS".to_string()))?,
            bootstrap_admin_email: lookup("BOOTSTRAP_ADMIN_EMAIL")
                .map(|email| email.trim().to_string())
                .filter(|email| !email.is_empty()),
        };

        if config.posting_fee < 0 || config.bid_fee < 0 {
            return Err(ApiError::Config("Fees must not be negative".to_string()));
        }
        if config.notify_max_attempts == 0 {
            return Err(ApiError::Config(
                "NOTIFY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn fees(&self) -> FeeSchedule {
        FeeSchedule {
            posting_fee: self.posting_fee,
            bid_fee: self.bid_fee,
        }
    }
}
