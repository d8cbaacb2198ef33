//! WhatsApp channel (Meta Cloud API via REST)

use async_trait::async_trait;

use super::{Message, NotificationChannel, Recipient};
use crate::error::BoxError;

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v20.0";

pub struct WhatsAppChannel {
    client: reqwest::Client,
    api_base: String,
    token: String,
    phone_number_id: String,
}

impl WhatsAppChannel {
    pub fn new(token: impl Into<String>, phone_number_id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: GRAPH_API_BASE.to_string(),
            token: token.into(),
            phone_number_id: phone_number_id.into(),
        }
    }
}

/// E.164 digits without `+`; bare 10-digit numbers are Indian mobiles
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        10 => Some(format!("91{digits}")),
        11..=15 => Some(digits),
        _ => None,
    }
}

#[async_trait]
impl NotificationChannel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    fn address<'a>(&self, recipient: &'a Recipient) -> Option<&'a str> {
        recipient.phone.as_deref()
    }

    async fn send(&self, to: &str, message: &Message) -> Result<(), BoxError> {
        let to = normalize_phone(to).ok_or_else(|| format!("Invalid phone number: {to}"))?;
        let resp = self
            .client
            .post(format!("{}/{}/messages", self.api_base, self.phone_number_id))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "text",
                "text": { "body": format!("*{}*\n\n{}", message.subject, message.body) },
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("WhatsApp API returned {status}: {body}").into());
        }

        tracing::info!(to = %to, subject = %message.subject, "WhatsApp message sent");
        Ok(())
    }
}
