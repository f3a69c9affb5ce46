use chrono::{DateTime, Duration, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

/// How long an issued code stays redeemable.
pub const OTC_TTL_MINUTES: i64 = 10;

/// Why a code was handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "otc_reason", rename_all = "snake_case")]
pub enum OtcReason {
    Promotional,
    Compensation,
    AdminOverride,
    Test,
}

/// A delivery channel for codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Sms,
    Email,
}

/// Who receives a code. The phone is mandatory, email is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// A stored one-time code.
///
/// The code value itself is never stored; `code_hash` is its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeCode {
    /// The unique identifier for the record.
    pub id: Uuid,
    /// Hex SHA-256 of the normalized code.
    pub code_hash: String,
    /// The single course this code unlocks.
    pub course_id: String,
    /// The recipient's name.
    pub recipient_name: String,
    /// The recipient's phone number (normalized).
    pub phone: String,
    /// The recipient's email address, if one was supplied.
    pub email: Option<String>,
    /// Why the code was issued.
    pub reason: OtcReason,
    /// The admin who issued it.
    pub issued_by: String,
    /// The timestamp when the code was issued.
    pub issued_at: DateTime<Utc>,
    /// The timestamp from which the code is no longer accepted.
    pub expires_at: DateTime<Utc>,
    /// Whether the code has been redeemed.
    pub consumed: bool,
    /// The timestamp of redemption.
    pub consumed_at: Option<DateTime<Utc>>,
    /// Whether the SMS gateway accepted the message.
    pub sms_sent: bool,
    /// Whether the email gateway accepted the message.
    pub email_sent: bool,
}

impl OneTimeCode {
    /// Builds a fresh, unconsumed record issued at `issued_at`.
    pub fn new(
        code_hash: String,
        course_id: &str,
        recipient: &Recipient,
        reason: OtcReason,
        issued_by: &str,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code_hash,
            course_id: course_id.to_string(),
            recipient_name: recipient.name.clone(),
            phone: recipient.phone.clone(),
            email: recipient.email.clone(),
            reason,
            issued_by: issued_by.to_string(),
            issued_at,
            expires_at: issued_at + Duration::minutes(OTC_TTL_MINUTES),
            consumed: false,
            consumed_at: None,
            sms_sent: false,
            email_sent: false,
        }
    }

    /// A code is expired from `expires_at` onwards, whether or not it was used.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Channels that were attempted: SMS always, email only with an address.
    pub fn delivery_channels(&self) -> Vec<DeliveryChannel> {
        let mut channels = vec![DeliveryChannel::Sms];
        if self.email.is_some() {
            channels.push(DeliveryChannel::Email);
        }
        channels
    }
}

impl TryFrom<&Row> for OneTimeCode {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            code_hash: row.try_get("code_hash")?,
            course_id: row.try_get("course_id")?,
            recipient_name: row.try_get("recipient_name")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            reason: row.try_get("reason")?,
            issued_by: row.try_get("issued_by")?,
            issued_at: row.try_get("issued_at")?,
            expires_at: row.try_get("expires_at")?,
            consumed: row.try_get("consumed")?,
            consumed_at: row.try_get("consumed_at")?,
            sms_sent: row.try_get("sms_sent")?,
            email_sent: row.try_get("email_sent")?,
        })
    }
}

/// What an issuing admin gets back. Never contains the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResult {
    pub sms_sent: bool,
    pub email_sent: bool,
    pub expires_at: DateTime<Utc>,
    pub course_name: String,
    pub delivery_channels: Vec<DeliveryChannel>,
}

/// A successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub code_id: Uuid,
    pub course_id: String,
    pub reason: OtcReason,
    pub redeemed_at: DateTime<Utc>,
}

/// The outcome of a conditional consume against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Redeemed(OneTimeCode),
    NotFound,
    CourseMismatch,
    Expired,
    AlreadyConsumed,
}

impl ConsumeOutcome {
    /// Classifies a record that the conditional consume did not update.
    ///
    /// Order matters: course scope, then expiry, then prior use.
    pub fn classify_unredeemed(
        record: Option<&OneTimeCode>,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        match record {
            None => ConsumeOutcome::NotFound,
            Some(code) if code.course_id != course_id => ConsumeOutcome::CourseMismatch,
            Some(code) if code.is_expired(now) => ConsumeOutcome::Expired,
            Some(code) if code.consumed => ConsumeOutcome::AlreadyConsumed,
            // Only reachable if the row changed between the update and the read.
            Some(_) => ConsumeOutcome::AlreadyConsumed,
        }
    }
}

/// Admin audit view of an issued code, without code or digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtcAuditEntry {
    pub id: Uuid,
    pub course_id: String,
    pub recipient_name: String,
    pub phone: String,
    pub has_email: bool,
    pub reason: OtcReason,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
    pub sms_sent: bool,
    pub email_sent: bool,
}

impl From<&OneTimeCode> for OtcAuditEntry {
    fn from(code: &OneTimeCode) -> Self {
        Self {
            id: code.id,
            course_id: code.course_id.clone(),
            recipient_name: code.recipient_name.clone(),
            phone: mask_phone(&code.phone),
            has_email: code.email.is_some(),
            reason: code.reason,
            issued_by: code.issued_by.clone(),
            issued_at: code.issued_at,
            expires_at: code.expires_at,
            consumed: code.consumed,
            consumed_at: code.consumed_at,
            sms_sent: code.sms_sent,
            email_sent: code.email_sent,
        }
    }
}

/// Keeps the country prefix and last four digits.
fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 7 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 7), tail)
}
