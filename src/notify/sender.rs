//! Delivery channels for one-time codes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::error::{AppError, Result};
use crate::models::otc::{DeliveryChannel, OTC_TTL_MINUTES};

/// Sends text messages.
#[async_trait]
pub trait SmsSender: Send + Sync + 'static {
    async fn send_sms(&self, phone: &str, body: &str) -> Result<()>;
}

/// Sends emails.
#[async_trait]
pub trait EmailSender: Send + Sync + 'static {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// The message carrying a code to its recipient.
///
/// Rendered texts contain the code, so they are wiped on drop.
pub struct CodeMessage<'a> {
    pub recipient_name: &'a str,
    pub course_name: &'a str,
    pub code: &'a str,
    pub expires_at: DateTime<Utc>,
}

impl CodeMessage<'_> {
    pub fn sms_text(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "Hi {}, your access code for {} is {}. It expires in {} minutes and works once.",
            self.recipient_name, self.course_name, self.code, OTC_TTL_MINUTES
        ))
    }

    pub fn email_subject(&self) -> String {
        format!("Your access code for {}", self.course_name)
    }

    pub fn email_text(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "Hi {},\n\nYour access code for {} is:\n\n    {}\n\n\
             Enter it on the course page before {} UTC. It can be used once.\n",
            self.recipient_name,
            self.course_name,
            self.code,
            self.expires_at.format("%Y-%m-%d %H:%M"),
        ))
    }
}

/// A channel with no gateway configured. Every send fails.
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredChannel(pub DeliveryChannel);

#[async_trait]
impl SmsSender for UnconfiguredChannel {
    async fn send_sms(&self, _phone: &str, _body: &str) -> Result<()> {
        Err(AppError::Internal(format!("{:?} gateway not configured", self.0)))
    }
}

#[async_trait]
impl EmailSender for UnconfiguredChannel {
    async fn send_email(&self, _to: &str, _subject: &str, _body: &str) -> Result<()> {
        Err(AppError::Internal(format!("{:?} gateway not configured", self.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_code_and_course() {
        let message = CodeMessage {
            recipient_name: "Asha",
            course_name: "Learn AI",
            code: "K7M2PQ9X",
            expires_at: Utc::now(),
        };
        assert!(message.sms_text().contains("K7M2PQ9X"));
        assert!(message.sms_text().contains("Learn AI"));
        assert!(message.email_text().contains("K7M2PQ9X"));
        assert_eq!(message.email_subject(), "Your access code for Learn AI");
    }

    #[tokio::test]
    async fn unconfigured_channel_fails() {
        let channel = UnconfiguredChannel(DeliveryChannel::Email);
        assert!(channel.send_email("a@b.io", "s", "b").await.is_err());
    }
}
