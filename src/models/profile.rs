use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ApprovalStatus, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub status: ApprovalStatus,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Contact and name fields an update may touch. `None` leaves a column as is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
}

impl ProfileChanges {
    /// Trim every field. A blank name or email carries no change; a blank
    /// contact field stays `Some("")` and clears the column.
    pub fn normalized(self) -> Self {
        let trim = |v: Option<String>| v.map(|s| s.trim().to_string());
        let required = |v: Option<String>| trim(v).filter(|s| !s.is_empty());
        Self {
            full_name: required(self.full_name),
            email: required(self.email),
            phone: trim(self.phone),
            date_of_birth: trim(self.date_of_birth),
            gender: trim(self.gender),
            address: trim(self.address),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.date_of_birth.is_none()
            && self.gender.is_none()
            && self.address.is_none()
    }
}

/// Auth identity backing a profile. Never serialized to clients.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub created_at: String,
}
