//! Operations produced by the comparator.

use crate::directory::{DirectoryAccount, DirectoryGroup};
use crate::field::FieldDiff;
use crate::storage::StorageDirectory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Kind of an operation. Deletion is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpKind {
    Create,
    Update,
    Disable,
}

impl OpKind {
    pub const ALL: [OpKind; 3] = [OpKind::Create, OpKind::Update, OpKind::Disable];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Create => "CREATE",
            OpKind::Update => "UPDATE",
            OpKind::Disable => "DISABLE",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation kind '{0}' (expected CREATE, UPDATE, or DISABLE)")]
pub struct ParseOpKindError(String);

impl FromStr for OpKind {
    type Err = ParseOpKindError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Ok(OpKind::Create),
            "UPDATE" => Ok(OpKind::Update),
            "DISABLE" => Ok(OpKind::Disable),
            _ => Err(ParseOpKindError(raw.to_string())),
        }
    }
}

/// One change to converge a single entity.
///
/// `Create` carries the desired entity. `Update` and `Disable` carry the
/// current one, `Update` along with the changed fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "UPPERCASE")]
pub enum Operation<E> {
    Create { entity: E },
    Update { entity: E, diff: FieldDiff },
    Disable { entity: E },
}

impl<E> Operation<E> {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Create { .. } => OpKind::Create,
            Operation::Update { .. } => OpKind::Update,
            Operation::Disable { .. } => OpKind::Disable,
        }
    }

    pub fn entity(&self) -> &E {
        match self {
            Operation::Create { entity }
            | Operation::Update { entity, .. }
            | Operation::Disable { entity } => entity,
        }
    }
}

/// Operations for every entity class, applied groups first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationSet {
    pub accounts: Vec<Operation<DirectoryAccount>>,
    pub groups: Vec<Operation<DirectoryGroup>>,
    pub directories: Vec<Operation<StorageDirectory>>,
}

impl OperationSet {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.groups.is_empty() && self.directories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accounts.len() + self.groups.len() + self.directories.len()
    }
}

/// Set of operation kinds that may be applied for one entity class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpFilter(BTreeSet<OpKind>);

impl Default for OpFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl OpFilter {
    pub fn all() -> Self {
        Self(OpKind::ALL.into_iter().collect())
    }

    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn allows(&self, kind: OpKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = OpKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<OpKind> for OpFilter {
    fn from_iter<I: IntoIterator<Item = OpKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
