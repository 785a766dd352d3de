use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "imagepolicy.k8s.io/v1alpha1";
pub const KIND: &str = "ImageReview";

/// Admission verdict in the `ImageReview` response schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub status: DecisionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionStatus {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Decision {
    pub fn allowed() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            status: DecisionStatus {
                allowed: true,
                reason: None,
            },
        }
    }

    /// A denial always carries a reason; an empty one is replaced by a generic message.
    pub fn denied(reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = "image has vulnerabilities".to_string();
        }
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            status: DecisionStatus {
                allowed: false,
                reason: Some(reason),
            },
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.status.allowed
    }

    pub fn reason(&self) -> Option<&str> {
        self.status.reason.as_deref()
    }
}
