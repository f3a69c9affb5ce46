use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};
use crate::notify::sender::{EmailSender, SmsSender};

#[derive(Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// A JSON-over-HTTP delivery gateway (SMS or email).
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    url: String,
    token: Option<Zeroizing<String>>,
}

impl HttpGateway {
    pub fn new(client: Client, url: &str, token: Option<Zeroizing<String>>) -> Self {
        Self {
            client,
            url: url.to_string(),
            token,
        }
    }

    async fn post<T: Serialize + Sync>(&self, payload: &T) -> Result<()> {
        let body = Zeroizing::new(
            sonic_rs::to_string(payload)
                .map_err(|e| AppError::Internal(format!("Gateway payload serialization failed: {}", e)))?,
        );

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Gateway {} answered {}",
                self.url,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SmsSender for HttpGateway {
    async fn send_sms(&self, phone: &str, body: &str) -> Result<()> {
        self.post(&SmsPayload { to: phone, message: body }).await
    }
}

#[async_trait]
impl EmailSender for HttpGateway {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.post(&EmailPayload {
            to,
            subject,
            text: body,
        })
        .await
    }
}
