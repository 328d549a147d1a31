// src/notify.rs

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};
use url::Url;

use crate::config::Config;

/// Where fatal-run alerts go.
#[derive(Debug, Clone)]
pub enum Notifier {
    /// POST a JSON alert to a relay (mail gateway, chat webhook, ...).
    Webhook { client: Client, url: Url },
    /// No relay configured; the alert only reaches the log.
    Log,
}

#[derive(Debug, Serialize)]
struct Alert<'a> {
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl Notifier {
    pub fn from_config(cfg: &Config, client: Client) -> Result<Self> {
        match &cfg.notify_webhook_url {
            Some(raw) => {
                let url = Url::parse(raw)
                    .with_context(|| format!("notify_webhook_url `{}` is not a valid URL", raw))?;
                Ok(Notifier::Webhook { client, url })
            }
            None => Ok(Notifier::Log),
        }
    }

    pub async fn notify_error(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        match self {
            Notifier::Webhook { client, url } => {
                client
                    .post(url.clone())
                    .json(&Alert {
                        recipient,
                        subject,
                        body,
                    })
                    .send()
                    .await
                    .with_context(|| format!("POST {} failed", url))?
                    .error_for_status()
                    .with_context(|| format!("Non-success status {}", url))?;
                info!(recipient, subject, "alert sent");
                Ok(())
            }
            Notifier::Log => {
                error!(recipient, subject, body, "alert");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn webhook_receives_alert_json() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alerts"))
            .and(body_json(serde_json::json!({
                "recipient": "ops@example.org",
                "subject": "CPT_RVU_CMS Error",
                "body": "Error occurred when listing the remote catalog: timeout",
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = Config {
            notify_webhook_url: Some(format!("{}/alerts", server.uri())),
            ..Config::default()
        };
        let notifier = Notifier::from_config(&cfg, Client::new())?;
        notifier
            .notify_error(
                "ops@example.org",
                "CPT_RVU_CMS Error",
                "Error occurred when listing the remote catalog: timeout",
            )
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn rejected_alert_is_an_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = Notifier::Webhook {
            client: Client::new(),
            url: Url::parse(&server.uri())?,
        };
        assert!(notifier.notify_error("a", "b", "c").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn log_notifier_never_fails() -> Result<()> {
        let notifier = Notifier::from_config(&Config::default(), Client::new())?;
        assert!(matches!(notifier, Notifier::Log));
        notifier.notify_error("a", "b", "c").await
    }

    #[test]
    fn bad_webhook_url_is_an_error() {
        let cfg = Config {
            notify_webhook_url: Some("not a url".into()),
            ..Config::default()
        };
        assert!(Notifier::from_config(&cfg, Client::new()).is_err());
    }
}
