//! Notification fan-out to push and SMS channels.
//!
//! Delivery is attempted once, synchronously, per alert firing. A failing
//! channel or recipient is logged and skipped; nothing is queued, batched or
//! retried.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{NotifyError, RegistryError};
use crate::models::NotificationRecord;
use crate::registry::{append_notification, Registry};

// ---

/// A single delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short channel name used in logs and errors.
    fn channel(&self) -> &'static str;

    async fn send(&self, recipient: &str, title: &str, body: &str) -> Result<(), NotifyError>;
}

async fn post_json<T: Serialize + ?Sized>(
    client: &Client,
    channel: &'static str,
    url: &str,
    payload: &T,
) -> Result<(), NotifyError> {
    // ---
    let response = client
        .post(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(payload)
        .send()
        .await
        .map_err(|source| NotifyError::Transport { channel, source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::Status { channel, status });
    }
    Ok(())
}

/// Push relay client. The recipient is a device push token.
#[derive(Debug, Clone)]
pub struct PushNotifier {
    client: Client,
    url: String,
}

impl PushNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for PushNotifier {
    fn channel(&self) -> &'static str {
        "push"
    }

    async fn send(&self, recipient: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "to": recipient,
            "sound": "default",
            "title": title,
            "body": body,
            "data": {},
        });
        post_json(&self.client, self.channel(), &self.url, &payload).await
    }
}

/// Credentials for the SMS gateway.
#[derive(Debug, Clone)]
pub struct SmsCredentials {
    pub api_key: String,
    pub partner_id: String,
    pub shortcode: String,
}

#[derive(Serialize)]
struct SmsPayload<'a> {
    apikey: &'a str,
    #[serde(rename = "partnerID")]
    partner_id: &'a str,
    message: &'a str,
    shortcode: &'a str,
    mobile: &'a str,
}

/// SMS gateway client. The recipient is a phone number; the title is not sent.
#[derive(Debug, Clone)]
pub struct SmsNotifier {
    client: Client,
    url: String,
    credentials: SmsCredentials,
}

impl SmsNotifier {
    pub fn new(client: Client, url: impl Into<String>, credentials: SmsCredentials) -> Self {
        Self {
            client,
            url: url.into(),
            credentials,
        }
    }
}

#[async_trait]
impl Notifier for SmsNotifier {
    fn channel(&self) -> &'static str {
        "sms"
    }

    async fn send(&self, recipient: &str, _title: &str, body: &str) -> Result<(), NotifyError> {
        let payload = SmsPayload {
            apikey: &self.credentials.api_key,
            partner_id: &self.credentials.partner_id,
            message: body,
            shortcode: &self.credentials.shortcode,
            mobile: recipient,
        };
        post_json(&self.client, self.channel(), &self.url, &payload).await
    }
}

// ---

/// Who to notify, resolved from the gateway profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recipients {
    pub push_tokens: Vec<String>,
    pub phone: Option<String>,
}

/// Per-channel delivery counts for one firing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub push_sent: usize,
    pub push_failed: usize,
    pub sms_sent: usize,
    pub sms_failed: usize,
}

pub struct Dispatcher {
    registry: Arc<dyn Registry>,
    push: Arc<dyn Notifier>,
    sms: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn Registry>,
        push: Arc<dyn Notifier>,
        sms: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            push,
            sms,
        }
    }

    /// Look up push tokens and the operator phone. A failed lookup means
    /// nobody to notify this time, not an error.
    pub async fn recipients(&self) -> Recipients {
        // ---
        match self.registry.gateway_profile().await {
            Ok(profile) => {
                let phone = profile.profile.phone.trim();
                Recipients {
                    push_tokens: profile
                        .token
                        .into_iter()
                        .filter(|t| !t.trim().is_empty())
                        .collect(),
                    phone: (!phone.is_empty()).then(|| phone.to_string()),
                }
            }
            Err(e) => {
                warn!("Could not load gateway profile, no recipients: {}", e);
                Recipients::default()
            }
        }
    }

    /// Push to every token, plus SMS to the operator phone when `with_sms`.
    pub async fn deliver(
        &self,
        recipients: &Recipients,
        title: &str,
        body: &str,
        with_sms: bool,
    ) -> DispatchReport {
        // ---
        let mut report = DispatchReport::default();

        for token in &recipients.push_tokens {
            match self.push.send(token, title, body).await {
                Ok(()) => report.push_sent += 1,
                Err(e) => {
                    warn!(channel = self.push.channel(), "Delivery failed: {}", e);
                    report.push_failed += 1;
                }
            }
        }

        if with_sms {
            match recipients.phone.as_deref() {
                Some(phone) => match self.sms.send(phone, title, body).await {
                    Ok(()) => report.sms_sent += 1,
                    Err(e) => {
                        warn!(channel = self.sms.channel(), "Delivery failed: {}", e);
                        report.sms_failed += 1;
                    }
                },
                None => debug!("No operator phone configured, skipping SMS"),
            }
        }

        info!(
            "Dispatched '{}': push {}/{} sms {}",
            title,
            report.push_sent,
            recipients.push_tokens.len(),
            report.sms_sent
        );
        report
    }

    /// Prepend `record` to the tank's message history.
    pub async fn record(
        &self,
        tank_id: &str,
        record: &NotificationRecord,
    ) -> Result<(), RegistryError> {
        append_notification(self.registry.as_ref(), tank_id, record).await
    }
}
