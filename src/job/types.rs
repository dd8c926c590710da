use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Indicates whether the job is live or test, used for filtering jobs in the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobCategory {
    Live,
    #[default]
    Test,
}

/// Root cause designation of a job failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Caused by client actions (invalid inputs, cancellation, input timeout).
    Client,
    /// Platform failure (worker crash, timeout, API unavailable).
    #[default]
    Server,
    /// Known limitation of the automated website.
    Website,
}

/// Describes why a job failed.
///
/// Missing fields take the defaults of an unknown server-side failure, so a
/// partial error object from the API still yields a usable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub category: ErrorCategory,
    #[serde(default = "default_error_code")]
    pub code: String,
    #[serde(default = "default_error_message")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

fn default_error_code() -> String {
    "UnknownError".to_string()
}

fn default_error_message() -> String {
    "Unknown error".to_string()
}

impl JobError {
    pub fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Used when a job failed but the API reported no error object.
    pub fn unknown() -> Self {
        Self::new(
            ErrorCategory::Server,
            default_error_code(),
            default_error_message(),
        )
    }
}

/// Data supplied to a job under a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    pub key: String,
    pub data: Value,
}

/// Data emitted by a job under a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub key: String,
    pub data: Value,
}

/// Parameters used when creating a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobInitParams {
    /// Service to run; falls back to the client's configured service id.
    pub service_id: Option<String>,
    pub category: JobCategory,
    /// Initial inputs, keyed by input key.
    pub input: Map<String, Value>,
}

impl JobInitParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    pub fn with_category(mut self, category: JobCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, data: Value) -> Self {
        self.input.insert(key.into(), data);
        self
    }
}

/// An active 3-D Secure challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tds {
    pub id: String,
    pub url: String,
}
