use serde::{Deserialize, Serialize};

/// A course (or paid application) known to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// The stable identifier used in URLs, codes and entitlements.
    pub id: String,
    /// The display name sent in messages and admin responses.
    pub name: String,
}
