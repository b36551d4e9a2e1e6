use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Envelope wrapped around every HTTP response body.
///
/// `code` is zero on success and mirrors the HTTP status otherwise.
#[derive(Debug, Serialize, Deserialize, TS)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: 0,
            message: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            success: false,
            code: 0,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }
}
