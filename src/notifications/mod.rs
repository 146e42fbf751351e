/*!
 * # Outbound Email
 *
 * Password-reset mail is the only email the storefront sends. Delivery goes
 * through the [`Mailer`] trait; production uses [`WebhookMailer`] to hand
 * messages to an external delivery service, while development falls back to
 * [`LogMailer`] which just logs the message (including the reset link).
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// An email ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Wire format posted to the delivery webhook.
#[derive(Debug, Serialize, Deserialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), ServiceError>;
}

/// HMAC signature generator for webhook authentication
pub struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Generate HMAC signature for webhook payload
    pub fn sign_payload(&self, timestamp: &str, body: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Mailer that posts messages to an external delivery webhook.
#[derive(Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    webhook_url: String,
    from: String,
    signature_generator: Option<Arc<SignatureGenerator>>,
    max_retries: u32,
}

impl WebhookMailer {
    pub fn new(webhook_url: String, from: String, webhook_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
            webhook_url,
            from,
            signature_generator: webhook_secret
                .map(|secret| Arc::new(SignatureGenerator::new(secret))),
            max_retries: 3,
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: EmailMessage) -> Result<(), ServiceError> {
        let payload = OutboundEmail {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            body: &message.body,
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;

        let timestamp = chrono::Utc::now().to_rfc3339();

        let signature = self
            .signature_generator
            .as_ref()
            .map(|gen| gen.sign_payload(&timestamp, &body));

        // Retry logic with exponential backoff
        for attempt in 1..=self.max_retries {
            let mut request = self
                .client
                .post(&self.webhook_url)
                .header("Content-Type", "application/json")
                .header("Timestamp", &timestamp)
                .body(body.clone());

            if let Some(ref sig) = signature {
                request = request.header("Webhook-Signature", sig);
            }

            match request.send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        info!("Email handed off to delivery webhook");
                        return Ok(());
                    } else {
                        warn!(
                            "Email delivery failed with status: {} (attempt {}/{})",
                            response.status(),
                            attempt,
                            self.max_retries
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        "Email delivery error: {} (attempt {}/{})",
                        e, attempt, self.max_retries
                    );
                }
            }

            // Exponential backoff: 1s, 2s, 4s
            if attempt < self.max_retries {
                let backoff = Duration::from_secs(2_u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }
        }

        error!(
            "Email delivery failed after {} attempts",
            self.max_retries
        );
        Err(ServiceError::ExternalServiceError(format!(
            "Failed to deliver email after {} retries",
            self.max_retries
        )))
    }
}

/// Mailer that logs instead of delivering. Default outside production so
/// reset links show up in the server log.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), ServiceError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Email (log delivery)"
        );
        Ok(())
    }
}

/// Picks the mailer implied by the configuration.
pub fn mailer_from_config(config: &AppConfig) -> Arc<dyn Mailer> {
    match &config.mailer_url {
        Some(url) => Arc::new(WebhookMailer::new(
            url.clone(),
            config.mail_from.clone(),
            config.mailer_secret.clone(),
        )),
        None => {
            info!("No mailer_url configured; emails will be logged only");
            Arc::new(LogMailer)
        }
    }
}

/// Sends in the background so callers never block on delivery. Failures are
/// logged; password-reset responses must not vary with delivery outcome.
pub fn send_detached(mailer: Arc<dyn Mailer>, message: EmailMessage) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(message).await {
            error!("Background email delivery failed: {}", e);
        }
    });
}
