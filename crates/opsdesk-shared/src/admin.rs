use chrono::{DateTime, Utc};

use crate::id::{AdminId, BusinessId, UserId};

/// Links an identity-service user to the ERP's authorization model.
/// Provisioned by the backend at signup, never created by this client.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct AdminRecord {
    pub id: AdminId,
    pub user_id: UserId,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Permits an admin record to see one business
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub admin_id: AdminId,
    pub business_id: BusinessId,
}
