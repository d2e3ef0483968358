use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CapabilityMatrix, Grant, Level};

/// A verified phone holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub phone: String,
    pub lvl: Level,
    pub acs: CapabilityMatrix,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(phone: String, lvl: Level, acs: CapabilityMatrix, created_at: DateTime<Utc>) -> Self {
        Self {
            account_id: Uuid::new_v4(),
            phone,
            lvl,
            acs,
            created_at,
        }
    }

    /// The claims an access token for this account carries.
    pub fn grant(&self) -> Grant {
        Grant::new(self.account_id.to_string(), self.lvl, self.acs.clone())
    }
}
