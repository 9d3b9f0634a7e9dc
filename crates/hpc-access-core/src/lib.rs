//! # hpc-access-core
//!
//! Reconciles the cluster's directory service and storage tiers against the
//! hpc-access registry.
//!
//! ```text
//! registry records ──► TargetStateBuilder ──► desired SystemState ─┐
//!                                                                   ├─► compare_states ─► OperationSet ─► Executor
//! directory + filesystem ──► gather_system_state ──► current ───────┘
//! ```
//!
//! A second flow folds observed directory usage back into the registry
//! (`fold_usage` + `push_usage`).
//!
//! Transport lives in the adapter crates (`hpc-access-ldap`,
//! `hpc-access-fs`, `hpc-access-registry`); this crate only defines the
//! collaborator traits they implement.

pub mod action;
pub mod builder;
pub mod collaborators;
pub mod comparator;
pub mod conventions;
pub mod diagnostics;
pub mod directory;
pub mod dump;
pub mod error;
pub mod executor;
pub mod field;
pub mod operation;
pub mod registry;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod usage;

#[cfg(test)]
mod fixtures;

pub use action::{AttributeChange, DirectoryAction, FsAction, symbolic_mode};
pub use builder::{BuildOutcome, GidAllocator, TargetStateBuilder, tb_to_bytes};
pub use collaborators::{
    DirectoryReader, FilesystemReader, RegistryReader, RegistryWriter, gather_registry_state,
    gather_system_state, push_usage,
};
pub use comparator::{compare, compare_states};
pub use diagnostics::{Diagnostics, Finding};
pub use directory::{DirectoryAccount, DirectoryGroup, Gecos};
pub use dump::{DumpOutcome, dump_registry_state};
pub use error::{ReconcileError, ReconcileResult};
pub use executor::{
    DirectoryWriter, ExecutionOptions, ExecutionReport, Executor, FilesystemWriter, ReadOnly,
    ReadOnlyError,
};
pub use field::{Diffable, FieldDiff, FieldValue};
pub use operation::{OpFilter, OpKind, Operation, OperationSet, ParseOpKindError};
pub use registry::{
    GroupFolders, RegistryGroup, RegistryProject, RegistryUser, ResourceData, ResourceDataUser,
    Status,
};
pub use snapshot::{SnapshotError, read_snapshot, write_snapshot};
pub use state::{RegistryState, SystemState};
pub use storage::{
    EntityKind, StorageDirectory, StoragePath, StoragePathError, Tier, UsageField, Volume,
};
pub use usage::{UsageFold, fold_usage};
