//! Error types for reconciliation.
//!
//! Every variant here aborts the run. Expected irregularities (unmanaged
//! directories, provisional registry records) are reported through
//! [`crate::diagnostics::Diagnostics`] instead.

use uuid::Uuid;

/// Fatal errors raised while building, comparing, or applying state.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A registry record references a record that does not exist.
    #[error("dangling {relation} reference from {from}: {target} does not exist")]
    DanglingReference {
        relation: &'static str,
        from: String,
        target: Uuid,
    },

    /// A current entity lacks an attribute that must always be present.
    #[error("{entity} is missing required attribute {attribute}")]
    MissingAttribute { entity: String, attribute: String },

    /// An update would change a field that must never change once assigned.
    #[error("refusing to change immutable field {field} of {entity}")]
    ImmutableField { entity: String, field: String },

    /// An update diff names a field the executor has no handler for.
    #[error("no handler for {class} diff field '{field}'")]
    UnknownDiffField { class: &'static str, field: String },

    /// An update diff carries a value of the wrong shape for its field.
    #[error("{class} diff field '{field}' expects {expected}")]
    UnexpectedFieldValue {
        class: &'static str,
        field: String,
        expected: &'static str,
    },

    /// A collaborator (directory service, filesystem, registry) failed.
    #[error("{system} failure: {source}")]
    Collaborator {
        system: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Snapshot(#[from] crate::snapshot::SnapshotError),
}

impl ReconcileError {
    /// Wrap a collaborator error, tagging the external system it came from.
    pub fn collaborator(
        system: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Collaborator {
            system,
            source: Box::new(source),
        }
    }

    /// Whether this error signals inconsistent upstream data.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::DanglingReference { .. }
                | Self::MissingAttribute { .. }
                | Self::ImmutableField { .. }
        )
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
