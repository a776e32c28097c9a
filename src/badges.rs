use serde::Serialize;
use tracing::warn;

use crate::config;

#[derive(Serialize)]
struct BadgeCheck<'a> {
    uuid:  &'a str,
    level: u32,
}

/// Fire-and-forget client for the badge-check collaborator. XP awards
/// call `notify` after persisting; a slow or dead badge service only
/// produces warnings, never a failed award.
pub struct BadgeNotifier {
    client: reqwest::Client,
    url:    Option<String>,
    token:  String,
}

impl BadgeNotifier {
    pub fn new(config: &config::BadgeConfig) -> BadgeNotifier {
        BadgeNotifier { client: reqwest::Client::new(),
                        url:    config.url.clone(),
                        token:  config.token.clone(), }
    }

    /// Notifier that never sends anything; used when no endpoint is
    /// configured and throughout the test suite.
    pub fn disabled() -> BadgeNotifier {
        BadgeNotifier { client: reqwest::Client::new(),
                        url:    None,
                        token:  String::new(), }
    }

    pub fn notify(&self, uuid: &str, level: u32) {
        let url = match &self.url {
            Some(url) => url.clone(),
            None => return,
        };

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&BadgeCheck { uuid, level });

        let uuid = uuid.to_string();
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(uuid, status = %response.status(), "badge check rejected");
                },
                Ok(_) => {},
                Err(err) => {
                    warn!(uuid, error = %err, "badge check failed");
                },
            }
        });
    }
}
