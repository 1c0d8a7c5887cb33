//! Service response envelope
//!
//! Every operation exposed to calling services is translated into this shape
//! so that callers never see a bare error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Well-formed result object returned across the service boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T> ServiceResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    pub fn err(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_code: Some(error.error_code().to_string()),
        }
    }

    /// Translate a crate result into the envelope
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                debug!(code = e.error_code(), "Translating error into response: {}", e);
                Self::err(&e)
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ServiceResponse<U> {
        ServiceResponse {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            error_code: self.error_code,
        }
    }
}

impl<T> From<Result<T>> for ServiceResponse<T> {
    fn from(result: Result<T>) -> Self {
        Self::from_result(result)
    }
}
