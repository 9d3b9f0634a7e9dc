//! Set-based comparison of two system states.

use crate::field::{Diffable, FieldDiff};
use crate::operation::{Operation, OperationSet};
use crate::state::SystemState;
use crate::storage::DIRECTORY_MUTABLE_FIELDS;
use std::collections::BTreeMap;
use tracing::debug;

/// Diff one entity class.
///
/// Keys only in `current` are disabled, keys only in `desired` are
/// created, and common keys are updated when any (allowed) field differs.
pub fn compare<E>(
    current: &BTreeMap<String, E>,
    desired: &BTreeMap<String, E>,
    allowed: Option<&[&str]>,
) -> Vec<Operation<E>>
where
    E: Diffable + Clone,
{
    let mut ops = Vec::new();
    for (key, entity) in current {
        match desired.get(key) {
            None => ops.push(Operation::Disable {
                entity: entity.clone(),
            }),
            Some(target) => {
                let diff = FieldDiff::between(entity, target, allowed);
                if !diff.is_empty() {
                    ops.push(Operation::Update {
                        entity: entity.clone(),
                        diff,
                    });
                }
            }
        }
    }
    for (key, entity) in desired {
        if !current.contains_key(key) {
            ops.push(Operation::Create {
                entity: entity.clone(),
            });
        }
    }
    debug!(class = E::CLASS, ops = ops.len(), "compared entities");
    ops
}

/// Operations that converge `current` to `desired`.
pub fn compare_states(current: &SystemState, desired: &SystemState) -> OperationSet {
    OperationSet {
        accounts: compare(&current.accounts, &desired.accounts, None),
        groups: compare(&current.groups, &desired.groups, None),
        directories: compare(
            &current.directories,
            &desired.directories,
            Some(DIRECTORY_MUTABLE_FIELDS),
        ),
    }
}
