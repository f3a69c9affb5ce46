use serde::{Deserialize, Deserializer, Serialize};

/// A user as reported by the identity provider.
///
/// This service never creates or stores users; it only reads the record
/// attached to the caller's session. Admin status is deliberately absent
/// here: it is always looked up through the identity provider's role
/// endpoint, never trusted from the session payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The identity provider's user id. Numeric ids are accepted and kept
    /// in their decimal string form.
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    /// The user's email address.
    #[serde(default)]
    pub email: Option<String>,
    /// The user's display name.
    #[serde(default)]
    pub name: Option<String>,
}

impl User {
    /// Creates a user with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
        }
    }
}

/// The caller acting on an admin or session route, as resolved by the guard.
///
/// `user` is `None` when the admin guard runs in health-cookie mode, which
/// validates the admin credential without resolving an identity.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: Option<User>,
}

impl Actor {
    /// The label recorded in audit columns (`issued_by`, `granted_by`, ...).
    pub fn label(&self) -> String {
        match &self.user {
            Some(user) => format!("user:{}", user.id),
            None => "admin-console".to_string(),
        }
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(s) if !s.trim().is_empty() => Ok(s),
        RawId::Text(_) => Err(serde::de::Error::custom("empty user id")),
        RawId::Number(n) => Ok(n.to_string()),
    }
}
