// dbbackup/src/notify/mod.rs
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backup::RunOutcome;
use crate::config::TelegramConfig;
use crate::errors::{BackupError, Result};

pub const FAILURE_PREFIX: &str = "Backup failed:\n\n";

/// Delivers the outcome of a run to a human.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, outcome: &RunOutcome) -> Result<()>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: Url,
    channel_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let mut endpoint = config.api_base_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| {
                BackupError::ConfigurationInvalid(format!(
                    "TG_API_BASE_URL cannot be used as a base: {}",
                    config.api_base_url
                ))
            })?
            .pop_if_empty()
            .push(&format!("bot{}", config.bot_token))
            .push("sendMessage");

        Ok(TelegramNotifier {
            client: reqwest::Client::new(),
            endpoint,
            channel_id: config.channel_id.clone(),
        })
    }
}

/// Text sent for an outcome; failures get a header line.
pub fn message_text(outcome: &RunOutcome) -> String {
    if outcome.success {
        outcome.message.clone()
    } else {
        format!("{}{}", FAILURE_PREFIX, outcome.message)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, outcome: &RunOutcome) -> Result<()> {
        tracing::info!("Sending message to Telegram channel");
        let text = message_text(outcome);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&SendMessage {
                chat_id: &self.channel_id,
                text: &text,
            })
            .send()
            .await
            // The bot token is part of the URL.
            .map_err(|e| BackupError::NotificationFailed(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackupError::NotificationFailed(format!(
                "Telegram API responded with {}: {}",
                status, body
            )));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        tracing::info!("Parsing Telegram API response");
        let body = response
            .text()
            .await
            .map_err(|e| BackupError::NotificationFailed(e.without_url().to_string()))?;
        let parsed: TelegramResponse = serde_json::from_str(&body).map_err(|e| {
            BackupError::NotificationFailed(format!(
                "Error when parsing Telegram API response: {}",
                e
            ))
        })?;
        if !parsed.ok {
            return Err(BackupError::NotificationFailed(format!(
                "Invalid response from Telegram API: {}",
                body
            )));
        }

        tracing::info!("Telegram message sent");
        Ok(())
    }
}
