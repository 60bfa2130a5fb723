use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub twilio: Option<TwilioConfig>,
    pub send_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = get("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let send_timeout = match get("SMS_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("SMS_TIMEOUT_SECS must be whole seconds, got '{raw}'"))?;
                anyhow::ensure!(secs > 0, "SMS_TIMEOUT_SECS must be greater than zero");
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
        };

        let twilio = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
                api_base: get("TWILIO_API_BASE")
                    .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            twilio,
            send_timeout,
        })
    }

    /// Messaging credentials, required only by commands that send.
    pub fn twilio(&self) -> anyhow::Result<&TwilioConfig> {
        self.twilio.as_ref().context(
            "TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER must be set to send SMS",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn database_url_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn defaults_apply_without_twilio() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/evals")]).unwrap();
        assert_eq!(config.send_timeout, Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS));
        assert!(config.twilio.is_none());
        assert!(config.twilio().is_err());
    }

    #[test]
    fn twilio_needs_all_three_credentials() {
        let partial = config_from(&[
            ("DATABASE_URL", "postgres://localhost/evals"),
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", ""),
            ("TWILIO_PHONE_NUMBER", "+15550000000"),
        ])
        .unwrap();
        assert!(partial.twilio.is_none());

        let full = config_from(&[
            ("DATABASE_URL", "postgres://localhost/evals"),
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "secret"),
            ("TWILIO_PHONE_NUMBER", "+15550000000"),
            ("SMS_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        let twilio = full.twilio().unwrap();
        assert_eq!(twilio.api_base, DEFAULT_TWILIO_API_BASE);
        assert_eq!(full.send_timeout, Duration::from_secs(5));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = config_from(&[
            ("DATABASE_URL", "postgres://localhost/evals"),
            ("SMS_TIMEOUT_SECS", "0"),
        ]);
        assert!(err.is_err());
    }
}
