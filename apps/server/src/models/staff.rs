//! Staff account model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Role given to every self-registered account.
pub const DEFAULT_ROLE: &str = "staff";

/// A hospital staff account. Usernames are unique per hospital.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Staff {
    pub id: Uuid,
    pub username: String,
    /// bcrypt hash; never serialized.
    #[serde(skip)]
    pub password_hash: String,
    pub hospital_id: String,
    pub display_name: Option<String>,
    pub role: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
