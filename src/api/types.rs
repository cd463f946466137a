use serde::Serialize;

use crate::models::{Account, AccountStatus};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub failed_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<String>,
}

impl From<&Account> for AccountDto {
    fn from(account: &Account) -> Self {
        let locked_until = match account.status {
            AccountStatus::TempBlocked { until } => Some(until.to_rfc3339()),
            _ => None,
        };

        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            role: account.role.as_str().to_string(),
            status: account.status.storage_tag().to_string(),
            failed_attempts: account.failed_attempts,
            locked_until,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub message: String,
    pub released: u64,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime: u64,
    pub database_ok: bool,
}
