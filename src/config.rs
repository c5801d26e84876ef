use std::{env, net::SocketAddr};

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_CURRENCY: &str = "usd";
pub const DEFAULT_PAYMENT_RECORD_TTL_HOURS: i64 = 24;
pub const DEFAULT_AUTH_TOKEN_TTL_MINUTES: i64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub bind_addr: SocketAddr,
    pub stripe: StripeSettings,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub auth_cookie_secure: bool,
    pub auth_token_ttl_minutes: i64,
    pub membership_currency: String,
    pub payment_record_ttl_hours: i64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("frontend_origin", &self.frontend_origin)
            .field("bind_addr", &self.bind_addr)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("membership_currency", &self.membership_currency)
            .finish_non_exhaustive()
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_i64(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match optional(name) {
        Some(raw) => raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        let bind_addr = optional("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let payment_record_ttl_hours =
            parse_i64("PAYMENT_RECORD_TTL_HOURS", DEFAULT_PAYMENT_RECORD_TTL_HOURS)?;
        if payment_record_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "PAYMENT_RECORD_TTL_HOURS",
                reason: "must be positive".into(),
            });
        }

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            frontend_origin: required("FRONTEND_ORIGIN")?,
            bind_addr,
            stripe: StripeSettings {
                secret_key: required("STRIPE_SECRET_KEY")?,
                webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            },
            jwt_secret: required("JWT_SECRET")?,
            jwt_issuer: optional("JWT_ISSUER").unwrap_or_else(|| "concierge".to_string()),
            jwt_audience: optional("JWT_AUDIENCE")
                .unwrap_or_else(|| "concierge-web".to_string()),
            auth_cookie_secure: optional("AUTH_COOKIE_SECURE")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
            auth_token_ttl_minutes: parse_i64(
                "AUTH_TOKEN_TTL_MINUTES",
                DEFAULT_AUTH_TOKEN_TTL_MINUTES,
            )?,
            membership_currency: optional("MEMBERSHIP_CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            payment_record_ttl_hours,
        })
    }

    pub fn checkout_success_url(&self) -> String {
        format!(
            "{}/membership/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.frontend_origin.trim_end_matches('/')
        )
    }

    pub fn checkout_cancel_url(&self) -> String {
        format!(
            "{}/membership/cancelled?session_id={{CHECKOUT_SESSION_ID}}",
            self.frontend_origin.trim_end_matches('/')
        )
    }

    pub fn upgrade_url(&self) -> String {
        format!("{}/membership", self.frontend_origin.trim_end_matches('/'))
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: String::new(),
        frontend_origin: "https://concierge.example.com/".into(),
        bind_addr: DEFAULT_BIND_ADDR.parse().unwrap(),
        stripe: StripeSettings {
            secret_key: "sk_test_stub".into(),
            webhook_secret: "whsec_0123456789abcdef".into(),
        },
        jwt_secret: "0123456789abcdef0123456789abcdef".into(),
        jwt_issuer: "test-issuer".into(),
        jwt_audience: "test-audience".into(),
        auth_cookie_secure: true,
        auth_token_ttl_minutes: DEFAULT_AUTH_TOKEN_TTL_MINUTES,
        membership_currency: DEFAULT_CURRENCY.into(),
        payment_record_ttl_hours: DEFAULT_PAYMENT_RECORD_TTL_HOURS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_urls_carry_session_placeholder() {
        let config = test_config();
        assert_eq!(
            config.checkout_success_url(),
            "https://concierge.example.com/membership/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert!(config
            .checkout_cancel_url()
            .ends_with("session_id={CHECKOUT_SESSION_ID}"));
        assert_eq!(config.upgrade_url(), "https://concierge.example.com/membership");
    }
}
