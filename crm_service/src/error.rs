use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{operation} → {status} {body}")]
    Status {
        operation: &'static str,
        url: String,
        status: u16,
        body: Value,
    },

    #[error("{operation} → response without an id: {body}")]
    MissingId {
        operation: &'static str,
        url: String,
        body: Value,
    },
}

impl CrmError {
    /// Vendor status code, when the CRM answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CrmError::Status { status, .. } => Some(*status),
            CrmError::MissingId { .. } | CrmError::Transport { .. } => None,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            CrmError::Transport { url, .. }
            | CrmError::Status { url, .. }
            | CrmError::MissingId { url, .. } => url,
        }
    }

    /// Vendor response body, or the transport error message.
    pub fn details(&self) -> Value {
        match self {
            CrmError::Transport { message, .. } => Value::String(message.clone()),
            CrmError::Status { body, .. } | CrmError::MissingId { body, .. } => body.clone(),
        }
    }
}
