//! Telegram Bot API sink

use super::{NotificationSink, TelegramSettings};
use crate::error::{Result, ScannerError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_URL: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TelegramSink {
    http: Client,
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramSink {
    pub fn new(settings: &TelegramSettings) -> Result<Self> {
        let http = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            http,
            bot_token: settings.bot_token.clone(),
            chat_id: settings.chat_id.clone(),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", API_URL, self.bot_token)
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    fn name(&self) -> &'static str {
        "Telegram"
    }

    /// Telegram has no subject line, the body carries everything
    async fn send(&self, _subject: &str, html_body: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text: html_body,
            parse_mode: "HTML",
        };

        let resp = self.http.post(self.send_url()).json(&request).send().await?;
        let status = resp.status();
        let body: SendMessageResponse = resp.json().await.unwrap_or_default();

        if !status.is_success() || !body.ok {
            let reason = body.description.unwrap_or_else(|| status.to_string());
            return Err(ScannerError::NotificationSend(format!("Telegram: {}", reason)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_url() {
        let sink = TelegramSink::new(&TelegramSettings {
            bot_token: "123:abc".into(),
            chat_id: "42".into(),
        })
        .unwrap();
        assert_eq!(sink.send_url(), "https://api.telegram.org/bot123:abc/sendMessage");
    }

    #[test]
    fn test_request_payload() {
        let req = SendMessageRequest {
            chat_id: "42",
            text: "🔔 <b>BTC/USDT</b>",
            parse_mode: "HTML",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["chat_id"], "42");
        assert_eq!(json["parse_mode"], "HTML");
    }

    #[test]
    fn test_not_ok_response() {
        let resp: SendMessageResponse =
            serde_json::from_str(r#"{"ok":false,"error_code":400,"description":"chat not found"}"#)
                .unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.description.as_deref(), Some("chat not found"));
    }
}
