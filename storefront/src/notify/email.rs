//! Email channel (AWS SES v2)

use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message as SesMessage};

use super::{Message, NotificationChannel, Recipient};
use crate::error::BoxError;

pub struct EmailChannel {
    ses: SesClient,
    from: String,
}

impl EmailChannel {
    pub fn new(ses: SesClient, from: impl Into<String>) -> Self {
        Self {
            ses,
            from: from.into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn address<'a>(&self, recipient: &'a Recipient) -> Option<&'a str> {
        recipient.email.as_deref().filter(|e| e.contains('@'))
    }

    async fn send(&self, to: &str, message: &Message) -> Result<(), BoxError> {
        let subject = Content::builder().data(&message.subject).build()?;
        let body = Body::builder()
            .text(Content::builder().data(&message.body).build()?)
            .build();
        let content = SesMessage::builder().subject(subject).body(body).build();

        self.ses
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(content).build())
            .send()
            .await?;

        tracing::info!(to = to, subject = %message.subject, "Email sent");
        Ok(())
    }
}
