//! Messaging transport used by the dispatcher.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::TwilioConfig;
use crate::error::TransportError;

/// Delivers one text message and returns the provider's message id.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_message(&self, body: &str, to: &str) -> Result<String, TransportError>;

    fn transport_name(&self) -> &str;
}

/// Twilio Programmable Messaging over its REST API.
pub struct TwilioTransport {
    client: reqwest::Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioTransport {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            messages_url: format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                config.api_base.trim_end_matches('/'),
                config.account_sid
            ),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
        }
    }
}

#[derive(Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    code: Option<i64>,
    message: String,
}

/// Prefers the provider's error message over the raw body when it parses.
fn describe_api_error(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody {
            code: Some(code),
            message,
        }) => format!("{message} (code {code})"),
        Ok(ApiErrorBody { code: None, message }) => message,
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl MessageTransport for TwilioTransport {
    async fn send_message(&self, body: &str, to: &str) -> Result<String, TransportError> {
        let response = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status: status.as_u16(),
                body: describe_api_error(&text),
            });
        }

        let message: MessageResource = response.json().await?;
        Ok(message.sid)
    }

    fn transport_name(&self) -> &str {
        "twilio"
    }
}
