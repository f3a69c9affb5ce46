use std::time::Duration;

use serde::{Serialize, Serializer};

/// How long the "Access Denied" notice is shown before navigating away.
pub const DENY_NOTICE: Duration = Duration::from_secs(2);

/// What a protected page has to satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Any signed-in user.
    RequireSession,
    /// A signed-in user holding the admin role.
    RequireAdmin,
    /// A valid admin cookie, checked by the admin health endpoint.
    RequireAdminHealthCookie,
    /// A signed-in user with effective access to a paid application.
    RequireEntitlement { app_id: String },
}

/// The outcome of a guard evaluation. The page must act on it before rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Decision {
    Allow,
    DenyRedirect {
        path: String,
    },
    DenyShow {
        message: String,
        #[serde(rename = "thenRedirectAfterMs", serialize_with = "as_millis")]
        then_redirect_after: Duration,
        redirect_to: String,
    },
}

impl Decision {
    /// Redirect without rendering anything.
    pub fn redirect(path: impl Into<String>) -> Self {
        Decision::DenyRedirect { path: path.into() }
    }

    /// Show `message` briefly, then go home.
    pub fn show(message: impl Into<String>) -> Self {
        Decision::DenyShow {
            message: message.into(),
            then_redirect_after: DENY_NOTICE,
            redirect_to: "/".to_string(),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_rs::JsonValueTrait;

    #[test]
    fn decisions_serialize_with_a_tag() {
        assert_eq!(sonic_rs::to_string(&Decision::Allow).unwrap(), r#"{"decision":"allow"}"#);

        let json = sonic_rs::to_string(&Decision::show("Access Denied")).unwrap();
        let value: sonic_rs::Value = sonic_rs::from_str(&json).unwrap();
        assert_eq!(value["decision"].as_str(), Some("deny_show"));
        assert_eq!(value["thenRedirectAfterMs"].as_u64(), Some(2000));
        assert_eq!(value["redirectTo"].as_str(), Some("/"));
    }
}
