//! Ordered, filterable collection of review issues.
//!
//! Insertion order is preserved independently of display order; display
//! order is computed on every `view` call, never stored.

use std::cmp::Ordering;
use std::collections::HashSet;

use shared::domain::{DismissalFeedback, Issue, IssueStatus, ModifiedFields};

use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct IssueStore {
    issues: Vec<Issue>,
}

impl IssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds new issues preserving arrival order. The server is trusted to
    /// emit each id once; no deduplication happens here.
    pub fn append(&mut self, issues: Vec<Issue>) {
        self.issues.extend(issues);
    }

    /// Replaces the entry with a matching id. Silent no-op when the id is
    /// absent; callers must not assume an update created an entry.
    pub fn update(&mut self, issue: Issue) {
        if let Some(slot) = self.issues.iter_mut().find(|i| i.id == issue.id) {
            *slot = issue;
        }
    }

    pub fn get(&self, id: &str) -> Option<&Issue> {
        self.issues.iter().find(|issue| issue.id == id)
    }

    /// Transitions `NotReviewed -> Accepted | Dismissed`, recording reviewer
    /// overrides when supplied. Every other transition is rejected.
    pub fn set_status(
        &mut self,
        id: &str,
        status: IssueStatus,
        modified_fields: Option<ModifiedFields>,
    ) -> Result<(), StoreError> {
        let issue = self
            .issues
            .iter_mut()
            .find(|issue| issue.id == id)
            .ok_or_else(|| StoreError::UnknownIssue(id.to_string()))?;

        if issue.status != IssueStatus::NotReviewed || status == IssueStatus::NotReviewed {
            return Err(StoreError::InvalidTransition {
                from: issue.status,
                to: status,
            });
        }

        issue.status = status;
        if let Some(fields) = modified_fields {
            if !fields.is_empty() {
                issue.modified_fields = Some(fields);
            }
        }
        Ok(())
    }

    /// Attaches a dismissal reason; only legal while the issue is dismissed.
    pub fn attach_feedback(&mut self, id: &str, reason: impl Into<String>) -> Result<(), StoreError> {
        let issue = self
            .issues
            .iter_mut()
            .find(|issue| issue.id == id)
            .ok_or_else(|| StoreError::UnknownIssue(id.to_string()))?;

        if issue.status != IssueStatus::Dismissed {
            return Err(StoreError::InvalidState {
                status: issue.status,
            });
        }

        issue.dismissal_feedback = Some(DismissalFeedback {
            reason: Some(reason.into()),
        });
        Ok(())
    }

    /// Filtered display order: page ascending, then bounding-box y0
    /// descending within a page (top of page first for a top-left origin).
    /// Issues without a location sort last; ties keep arrival order because
    /// the sort is stable.
    pub fn view(
        &self,
        status_filter: &HashSet<IssueStatus>,
        hidden_types: &HashSet<String>,
    ) -> Vec<&Issue> {
        let mut rows: Vec<&Issue> = self
            .issues
            .iter()
            .filter(|issue| {
                status_filter.contains(&issue.status) && !hidden_types.contains(&issue.kind)
            })
            .collect();
        rows.sort_by(|a, b| display_order(a, b));
        rows
    }

    /// Total number of issues of one type, regardless of any filter. Used
    /// for per-type badges.
    pub fn count_of_kind(&self, kind: &str) -> usize {
        self.issues.iter().filter(|issue| issue.kind == kind).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

fn display_order(a: &Issue, b: &Issue) -> Ordering {
    match (&a.location, &b.location) {
        (Some(la), Some(lb)) => la.page_num.cmp(&lb.page_num).then_with(|| {
            match (la.bounding_box_y0(), lb.bounding_box_y0()) {
                // Descending y0; NaN or missing coordinates fall back to
                // arrival order via Equal.
                (Some(ya), Some(yb)) => yb.partial_cmp(&ya).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            }
        }),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
