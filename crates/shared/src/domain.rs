use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    NotReviewed,
    Accepted,
    Dismissed,
}

impl IssueStatus {
    pub const ALL: [IssueStatus; 3] = [
        IssueStatus::NotReviewed,
        IssueStatus::Accepted,
        IssueStatus::Dismissed,
    ];
}

/// Where an issue was found inside the document. Issues without a location
/// cannot be highlighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub source_sentence: String,
    pub page_num: u32,
    pub bounding_box: Vec<f64>,
    pub para_index: u32,
}

impl Location {
    pub fn has_bounding_box(&self) -> bool {
        !self.bounding_box.is_empty()
    }

    /// Top edge of the bounding box ([x0, y0, x1, y1]).
    pub fn bounding_box_y0(&self) -> Option<f64> {
        self.bounding_box.get(1).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl ModifiedFields {
    pub fn is_empty(&self) -> bool {
        self.explanation.is_none() && self.suggested_fix.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DismissalFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: IssueStatus,
    pub explanation: String,
    pub suggested_fix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub review_initiated_by: String,
    #[serde(rename = "review_initiated_at_UTC")]
    pub review_initiated_at_utc: DateTime<Utc>,
    #[serde(
        default,
        rename = "resolved_at_UTC",
        skip_serializing_if = "Option::is_none"
    )]
    pub resolved_at_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_fields: Option<ModifiedFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissal_feedback: Option<DismissalFeedback>,
}

impl Issue {
    /// Reviewer-modified explanation wins over the original for display.
    pub fn effective_explanation(&self) -> &str {
        self.modified_fields
            .as_ref()
            .and_then(|fields| fields.explanation.as_deref())
            .unwrap_or(&self.explanation)
    }

    pub fn effective_suggested_fix(&self) -> &str {
        self.modified_fields
            .as_ref()
            .and_then(|fields| fields.suggested_fix.as_deref())
            .unwrap_or(&self.suggested_fix)
    }

    pub fn page_num(&self) -> Option<u32> {
        self.location.as_ref().map(|location| location.page_num)
    }
}

/// Display configuration for one issue type (badge color + blurb).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueTypeConfig {
    pub color: String,
    pub description: String,
}

/// Issue type name -> display configuration, supplied by the deployment.
pub type AgentConfig = HashMap<String, IssueTypeConfig>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}
