//! Non-fatal findings collected while reconciling.

use serde::{Deserialize, Serialize};

pub const WARNING_CLASS_PATH_UNMATCHED: &str = "storage.path.unmatched";
pub const WARNING_CLASS_PATH_UNTRACKED: &str = "storage.path.untracked";
pub const WARNING_CLASS_NAME_MISMATCH: &str = "storage.name.mismatch";
pub const WARNING_CLASS_USAGE_UNMEASURED: &str = "storage.usage.unmeasured";
pub const WARNING_CLASS_REGISTRY_MISSING: &str = "registry.record.missing";
pub const WARNING_CLASS_QUOTA_MISSING: &str = "registry.quota.missing";
pub const WARNING_CLASS_OWNER_MISSING: &str = "registry.owner.missing";
pub const WARNING_CLASS_DUMP_SKIPPED: &str = "dump.record.skipped";

/// One skipped or questionable entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub class: String,
    pub subject: String,
    pub message: String,
}

/// Ordered collection of findings returned alongside a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostics {
    findings: Vec<Finding>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(
        &mut self,
        class: &str,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.findings.push(Finding {
            class: class.to_string(),
            subject: subject.into(),
            message: message.into(),
        });
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    /// Findings of one class, in insertion order.
    pub fn of_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.class == class)
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.findings.extend(other.findings);
    }

    /// Emit every finding as a `warn!` event.
    pub fn log(&self) {
        for finding in &self.findings {
            tracing::warn!(
                class = %finding.class,
                subject = %finding.subject,
                "{}",
                finding.message
            );
        }
    }
}
