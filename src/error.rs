use thiserror::Error;

#[derive(Error, Debug)]
pub enum AxbridgeError {
    #[error("Browser not found. Please install Chrome, Brave, or Edge.")]
    BrowserNotFound,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("CDP connection failed: {0}")]
    CdpConnectionFailed(String),

    #[error("Browser not running. Use 'axbridge goto <url>' or 'axbridge connect <endpoint>' first.")]
    BrowserNotRunning,

    #[error("Ref '{reference}' not found in the current snapshot. Take a new snapshot and use a ref from it.")]
    RefNotFound { reference: String },

    #[error("Element not found for ref '{reference}' (role: {role}, name: \"{name}\"). The page changed since the snapshot; take a new snapshot.")]
    ElementNotFound {
        reference: String,
        role: String,
        name: String,
    },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cloud API error: {0}")]
    CloudError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AxbridgeError {
    /// Machine-readable kind reported to tool callers.
    pub fn kind(&self) -> &'static str {
        match self {
            AxbridgeError::RefNotFound { .. } => "ref_not_found",
            AxbridgeError::ElementNotFound { .. } => "element_not_found",
            AxbridgeError::InvalidArguments(_) => "invalid_arguments",
            _ => "failure",
        }
    }

    /// Structured failure payload for the tool boundary.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });

        match self {
            AxbridgeError::RefNotFound { reference } => {
                payload["ref"] = serde_json::json!(reference);
            }
            AxbridgeError::ElementNotFound {
                reference,
                role,
                name,
            } => {
                payload["ref"] = serde_json::json!(reference);
                payload["role"] = serde_json::json!(role);
                payload["name"] = serde_json::json!(name);
            }
            _ => {}
        }

        payload
    }
}

pub type Result<T> = std::result::Result<T, AxbridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_not_found_payload_carries_ref() {
        let err = AxbridgeError::RefNotFound {
            reference: "0-7".to_string(),
        };
        let payload = err.to_payload();

        assert_eq!(payload["error"], "ref_not_found");
        assert_eq!(payload["ref"], "0-7");
        assert!(payload["message"]
            .as_str()
            .unwrap()
            .contains("new snapshot"));
    }

    #[test]
    fn element_not_found_payload_names_role_and_name() {
        let err = AxbridgeError::ElementNotFound {
            reference: "0-3".to_string(),
            role: "button".to_string(),
            name: "Save".to_string(),
        };
        let payload = err.to_payload();

        assert_eq!(payload["error"], "element_not_found");
        assert_eq!(payload["role"], "button");
        assert_eq!(payload["name"], "Save");
    }

    #[test]
    fn pass_through_errors_are_generic_failures() {
        let err = AxbridgeError::Timeout("Navigation timeout".to_string());
        let payload = err.to_payload();

        assert_eq!(payload["error"], "failure");
        assert_eq!(payload["message"], "Timeout: Navigation timeout");
        assert!(payload.get("ref").is_none());
    }
}
