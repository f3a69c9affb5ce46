use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::crypto::otc::{generate_code, hash_code, normalize_code};
use crate::error::{AppError, Result};
use crate::models::otc::{
    ConsumeOutcome, IssueResult, OneTimeCode, OtcAuditEntry, OtcReason, Recipient, Redemption,
};
use crate::notify::sender::CodeMessage;
use crate::state::AppState;
use crate::validation::otc::{normalize_email, normalize_phone};

/// How many fresh codes to draw before giving up on digest collisions.
const MAX_CODE_ATTEMPTS: usize = 5;
/// Longest input accepted as a code before hashing.
const MAX_CODE_INPUT: usize = 64;
/// Default and maximum page size of the audit listing.
const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_AUDIT_LIMIT: i64 = 200;

/// Issues a one-time code for `course_id` and delivers it to the recipient.
///
/// SMS is always attempted, email only when an address is given. Delivery
/// failures are reported in the result, never returned as errors. The code
/// itself is not part of the result.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `recipient` - Who receives the code.
/// * `course_id` - The course the code unlocks.
/// * `reason` - Why the code is issued.
/// * `issued_by` - Audit label of the issuing admin.
///
/// # Returns
///
/// A `Result` containing the delivery report.
pub async fn issue_code(
    state: &AppState,
    recipient: Recipient,
    course_id: &str,
    reason: OtcReason,
    issued_by: &str,
) -> Result<IssueResult> {
    issue_code_at(state, recipient, course_id, reason, issued_by, Utc::now()).await
}

/// [`issue_code`] with an explicit issue time.
pub async fn issue_code_at(
    state: &AppState,
    recipient: Recipient,
    course_id: &str,
    reason: OtcReason,
    issued_by: &str,
    now: DateTime<Utc>,
) -> Result<IssueResult> {
    let course = state.catalog.require(course_id)?.clone();

    let name = recipient.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Recipient name cannot be empty".to_string()));
    }
    let recipient = Recipient {
        name,
        phone: normalize_phone(&recipient.phone)?,
        email: normalize_email(recipient.email.as_deref()),
    };

    let (record, code) = allocate_code(state, &recipient, &course.id, reason, issued_by, now).await?;

    let message = CodeMessage {
        recipient_name: &record.recipient_name,
        course_name: &course.name,
        code: &code,
        expires_at: record.expires_at,
    };

    let sms_sent = match state.sms.send_sms(&record.phone, &message.sms_text()).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(code_id = %record.id, error = %e, "❌ SMS delivery failed");
            false
        }
    };

    let email_sent = match &record.email {
        Some(address) => {
            match state
                .email
                .send_email(address, &message.email_subject(), &message.email_text())
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(code_id = %record.id, error = %e, "❌ Email delivery failed");
                    false
                }
            }
        }
        None => false,
    };

    drop(code);

    state
        .otc_store
        .record_delivery(record.id, sms_sent, email_sent)
        .await?;

    if !sms_sent && !email_sent {
        tracing::warn!(code_id = %record.id, "⚠️ One-time code issued but no channel delivered it");
    }

    tracing::info!(
        code_id = %record.id,
        course_id = %record.course_id,
        reason = ?record.reason,
        issued_by = %record.issued_by,
        sms_sent,
        email_sent,
        "✅ One-time code issued"
    );

    Ok(IssueResult {
        sms_sent,
        email_sent,
        expires_at: record.expires_at,
        course_name: course.name,
        delivery_channels: record.delivery_channels(),
    })
}

/// Generates a code whose digest is not yet stored and persists it.
async fn allocate_code(
    state: &AppState,
    recipient: &Recipient,
    course_id: &str,
    reason: OtcReason,
    issued_by: &str,
    now: DateTime<Utc>,
) -> Result<(OneTimeCode, Zeroizing<String>)> {
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = generate_code();
        let record = OneTimeCode::new(hash_code(&code), course_id, recipient, reason, issued_by, now);

        if state.otc_store.try_insert(&record).await? {
            return Ok((record, code));
        }
        tracing::warn!(attempt, "Generated code collided with an existing one, drawing again");
    }

    Err(AppError::Internal(
        "Could not allocate a unique one-time code".to_string(),
    ))
}

/// Redeems `code` for `course_id`. At most one call per code ever succeeds.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `code` - The code as entered by the user.
/// * `course_id` - The course it is presented for.
///
/// # Returns
///
/// A `Result` containing the redemption, or the specific reason it failed.
pub async fn verify_code(state: &AppState, code: &str, course_id: &str) -> Result<Redemption> {
    verify_code_at(state, code, course_id, Utc::now()).await
}

/// [`verify_code`] at an explicit instant.
pub async fn verify_code_at(
    state: &AppState,
    code: &str,
    course_id: &str,
    now: DateTime<Utc>,
) -> Result<Redemption> {
    let normalized = normalize_code(code);
    if normalized.is_empty() || normalized.len() > MAX_CODE_INPUT {
        return Err(AppError::Validation("Code must be between 1 and 64 characters".to_string()));
    }
    let course_id = course_id.trim();
    if course_id.is_empty() {
        return Err(AppError::Validation("Course id cannot be empty".to_string()));
    }

    let digest = hash_code(&normalized);

    match state.otc_store.consume(&digest, course_id, now).await? {
        ConsumeOutcome::Redeemed(record) => {
            tracing::info!(code_id = %record.id, course_id, "✅ One-time code redeemed");
            Ok(Redemption {
                code_id: record.id,
                course_id: record.course_id,
                reason: record.reason,
                redeemed_at: record.consumed_at.unwrap_or(now),
            })
        }
        ConsumeOutcome::NotFound => Err(AppError::CodeNotFound),
        ConsumeOutcome::CourseMismatch => {
            tracing::warn!(course_id, "One-time code presented for the wrong course");
            Err(AppError::CodeCourseMismatch)
        }
        ConsumeOutcome::Expired => Err(AppError::CodeExpired),
        ConsumeOutcome::AlreadyConsumed => {
            tracing::warn!(course_id, "Replay of a redeemed one-time code");
            Err(AppError::CodeAlreadyConsumed)
        }
    }
}

/// Lists recently issued codes for the admin audit view.
pub async fn list_codes(
    state: &AppState,
    course_id: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<OtcAuditEntry>> {
    if let Some(course_id) = course_id {
        state.catalog.require(course_id)?;
    }
    let limit = limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_AUDIT_LIMIT);

    let codes = state.otc_store.list_recent(course_id, limit).await?;
    Ok(codes.iter().map(OtcAuditEntry::from).collect())
}
