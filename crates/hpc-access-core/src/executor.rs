//! Apply operations to the directory service and the filesystem.
//!
//! The executor turns each operation into primitive [`DirectoryAction`]s
//! and [`FsAction`]s. It is the only place that knows how a diff field maps
//! onto an attribute or a command. Every action is logged on the `audit`
//! target before it runs, including in dry-run mode.

use crate::action::{AttributeChange, DirectoryAction, FsAction, symbolic_mode};
use crate::collaborators::{
    GROUPS_ENDPOINT, PROJECTS_ENDPOINT, RegistryWriter, SYSTEM_DIRECTORY, SYSTEM_FILESYSTEM,
    USERS_ENDPOINT,
};
use crate::conventions::{
    ACCOUNT_OBJECT_CLASSES, GROUP_OBJECT_CLASSES, LOGIN_SHELL_DISABLED, XATTR_QUOTA_BYTES,
    XATTR_QUOTA_FILES,
};
use crate::directory::{DirectoryAccount, DirectoryGroup};
use crate::error::{ReconcileError, ReconcileResult};
use crate::field::{Diffable, FieldDiff, FieldValue};
use crate::operation::{OpFilter, Operation, OperationSet};
use crate::registry::{ResourceData, ResourceDataUser};
use crate::storage::StorageDirectory;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Executes directory-service actions.
pub trait DirectoryWriter {
    type Error: std::error::Error + Send + Sync + 'static;

    fn execute(&mut self, action: &DirectoryAction) -> Result<(), Self::Error>;
}

/// Executes filesystem actions.
pub trait FilesystemWriter {
    type Error: std::error::Error + Send + Sync + 'static;

    fn execute(&mut self, action: &FsAction) -> Result<(), Self::Error>;
}

/// Writer that refuses every action. Stands in for a live connection when
/// planning offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnly;

#[derive(Debug, thiserror::Error)]
#[error("read-only writer refused: {0}")]
pub struct ReadOnlyError(String);

impl DirectoryWriter for ReadOnly {
    type Error = ReadOnlyError;

    fn execute(&mut self, action: &DirectoryAction) -> Result<(), Self::Error> {
        Err(ReadOnlyError(action.to_string()))
    }
}

impl FilesystemWriter for ReadOnly {
    type Error = ReadOnlyError;

    fn execute(&mut self, action: &FsAction) -> Result<(), Self::Error> {
        Err(ReadOnlyError(action.to_string()))
    }
}

impl RegistryWriter for ReadOnly {
    type Error = ReadOnlyError;

    fn update_user_resources_used(
        &mut self,
        uuid: Uuid,
        _used: &ResourceDataUser,
    ) -> Result<(), Self::Error> {
        Err(ReadOnlyError(format!("{USERS_ENDPOINT}{uuid}/")))
    }

    fn update_group_resources_used(
        &mut self,
        uuid: Uuid,
        _used: &ResourceData,
    ) -> Result<(), Self::Error> {
        Err(ReadOnlyError(format!("{GROUPS_ENDPOINT}{uuid}/")))
    }

    fn update_project_resources_used(
        &mut self,
        uuid: Uuid,
        _used: &ResourceData,
    ) -> Result<(), Self::Error> {
        Err(ReadOnlyError(format!("{PROJECTS_ENDPOINT}{uuid}/")))
    }
}

/// Dry-run flag and per-class operation filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub dry_run: bool,
    pub account_ops: OpFilter,
    pub group_ops: OpFilter,
    pub directory_ops: OpFilter,
}

/// What an execution did, or would have done under dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub dry_run: bool,
    /// Operations that passed the filters and produced actions.
    pub applied: usize,
    /// Operations rejected by the filters.
    pub filtered: usize,
    /// Operations that passed the filters but needed no action.
    pub noop: usize,
    /// Rendered actions, in execution order.
    pub actions: Vec<String>,
}

pub struct Executor<D, F> {
    directory: D,
    filesystem: F,
    options: ExecutionOptions,
    report: ExecutionReport,
}

impl<D, F> Executor<D, F>
where
    D: DirectoryWriter,
    F: FilesystemWriter,
{
    pub fn new(directory: D, filesystem: F, options: ExecutionOptions) -> Self {
        let report = ExecutionReport {
            dry_run: options.dry_run,
            ..ExecutionReport::default()
        };
        Self {
            directory,
            filesystem,
            options,
            report,
        }
    }

    pub fn report(&self) -> &ExecutionReport {
        &self.report
    }

    /// Hand back the writers and the report.
    pub fn into_parts(self) -> (D, F, ExecutionReport) {
        (self.directory, self.filesystem, self.report)
    }

    /// Apply all operations: groups, then accounts, then directories.
    ///
    /// Stops at the first failure. Anything already applied will diff as
    /// unchanged on the next run.
    pub fn apply(&mut self, ops: &OperationSet) -> ReconcileResult<()> {
        for op in &ops.groups {
            if self.admit(op, |options| &options.group_ops) {
                self.counted(|this| match op {
                    Operation::Create { entity } => this.create_group(entity),
                    Operation::Update { entity, diff } => this.update_group(entity, diff),
                    Operation::Disable { entity } => this.disable_group(entity),
                })?;
            }
        }
        for op in &ops.accounts {
            if self.admit(op, |options| &options.account_ops) {
                self.counted(|this| match op {
                    Operation::Create { entity } => this.create_account(entity),
                    Operation::Update { entity, diff } => this.update_account(entity, diff),
                    Operation::Disable { entity } => this.disable_account(entity),
                })?;
            }
        }
        for op in &ops.directories {
            if self.admit(op, |options| &options.directory_ops) {
                self.counted(|this| match op {
                    Operation::Create { entity } => this.create_directory(entity),
                    Operation::Update { entity, diff } => this.update_directory(entity, diff),
                    Operation::Disable { entity } => this.disable_directory(entity),
                })?;
            }
        }
        info!(
            applied = self.report.applied,
            filtered = self.report.filtered,
            noop = self.report.noop,
            dry_run = self.options.dry_run,
            "operations processed"
        );
        Ok(())
    }

    fn admit<E: Diffable>(
        &mut self,
        op: &Operation<E>,
        filter: impl Fn(&ExecutionOptions) -> &OpFilter,
    ) -> bool {
        let kind = op.kind();
        if filter(&self.options).allows(kind) {
            return true;
        }
        debug!(class = E::CLASS, key = op.entity().key(), op = %kind, "operation filtered");
        self.report.filtered += 1;
        false
    }

    fn counted(
        &mut self,
        apply: impl FnOnce(&mut Self) -> ReconcileResult<()>,
    ) -> ReconcileResult<()> {
        let before = self.report.actions.len();
        apply(self)?;
        if self.report.actions.len() > before {
            self.report.applied += 1;
        } else {
            self.report.noop += 1;
        }
        Ok(())
    }

    fn run_directory(&mut self, action: DirectoryAction) -> ReconcileResult<()> {
        let rendered = action.to_string();
        info!(target: "audit", "+ {rendered}");
        self.report.actions.push(rendered);
        if !self.options.dry_run {
            self.directory
                .execute(&action)
                .map_err(|err| ReconcileError::collaborator(SYSTEM_DIRECTORY, err))?;
        }
        Ok(())
    }

    fn run_filesystem(&mut self, action: FsAction) -> ReconcileResult<()> {
        let rendered = action.to_string();
        info!(target: "audit", "+ {rendered}");
        self.report.actions.push(rendered);
        if !self.options.dry_run {
            self.filesystem
                .execute(&action)
                .map_err(|err| ReconcileError::collaborator(SYSTEM_FILESYSTEM, err))?;
        }
        Ok(())
    }

    pub fn create_account(&mut self, account: &DirectoryAccount) -> ReconcileResult<()> {
        let mut attributes = object_classes(ACCOUNT_OBJECT_CLASSES);
        push_attr(&mut attributes, "cn", Some(&account.cn));
        push_attr(&mut attributes, "uid", Some(&account.uid));
        push_attr(&mut attributes, "uidNumber", Some(&account.uid_number.to_string()));
        push_attr(
            &mut attributes,
            "gidNumber",
            account.gid_number.map(|gid| gid.to_string()).as_ref(),
        );
        push_attr(&mut attributes, "homeDirectory", Some(&account.home_directory));
        push_attr(&mut attributes, "loginShell", Some(&account.login_shell));
        push_attr(&mut attributes, "sn", account.sn.as_ref());
        push_attr(&mut attributes, "givenName", account.given_name.as_ref());
        push_attr(&mut attributes, "mail", account.mail.as_ref());
        push_attr(
            &mut attributes,
            "gecos",
            account.gecos.as_ref().map(|gecos| gecos.render()).as_ref(),
        );
        if !account.ssh_public_key.is_empty() {
            attributes.push(("sshPublicKey".to_string(), account.ssh_public_key.clone()));
        }
        self.run_directory(DirectoryAction::Add {
            dn: account.dn.clone(),
            attributes,
        })
    }

    /// Set the login shell to the disabled shell. Already disabled
    /// accounts are left alone.
    pub fn disable_account(&mut self, account: &DirectoryAccount) -> ReconcileResult<()> {
        if account.is_disabled() {
            debug!(uid = %account.uid, "account already disabled");
            return Ok(());
        }
        self.run_directory(DirectoryAction::Modify {
            dn: account.dn.clone(),
            changes: vec![AttributeChange::Replace {
                attribute: "loginShell".to_string(),
                values: vec![LOGIN_SHELL_DISABLED.to_string()],
            }],
        })
    }

    pub fn update_account(
        &mut self,
        account: &DirectoryAccount,
        diff: &FieldDiff,
    ) -> ReconcileResult<()> {
        const CLASS: &str = DirectoryAccount::CLASS;
        let mut new_dn = None;
        let mut changes = Vec::new();
        for (field, value) in diff.iter() {
            let (attribute, shape) = match field {
                "dn" => {
                    new_dn = Some(expect_text(CLASS, field, value)?);
                    continue;
                }
                "uid_number" => {
                    return Err(ReconcileError::ImmutableField {
                        entity: account.uid.clone(),
                        field: field.to_string(),
                    });
                }
                "cn" => ("cn", Shape::Text),
                "uid" => ("uid", Shape::Text),
                "mail" => ("mail", Shape::Text),
                "sn" => ("sn", Shape::Text),
                "given_name" => ("givenName", Shape::Text),
                "gid_number" => ("gidNumber", Shape::Number),
                "home_directory" => ("homeDirectory", Shape::Text),
                "login_shell" => ("loginShell", Shape::Text),
                "gecos" => ("gecos", Shape::Gecos),
                "ssh_public_key" => ("sshPublicKey", Shape::List),
                _ => {
                    return Err(ReconcileError::UnknownDiffField {
                        class: CLASS,
                        field: field.to_string(),
                    });
                }
            };
            changes.push(attribute_change(CLASS, field, attribute, shape, value)?);
        }
        self.modify_entry(&account.dn, new_dn, changes)
    }

    pub fn create_group(&mut self, group: &DirectoryGroup) -> ReconcileResult<()> {
        let mut attributes = object_classes(GROUP_OBJECT_CLASSES);
        push_attr(&mut attributes, "cn", Some(&group.cn));
        push_attr(&mut attributes, "gidNumber", Some(&group.gid_number.to_string()));
        push_attr(&mut attributes, "description", group.description.as_ref());
        push_attr(&mut attributes, "bih-groupOwnerDN", group.owner_dn.as_ref());
        if !group.delegate_dns.is_empty() {
            attributes.push((
                "bih-groupDelegateDNs".to_string(),
                group.delegate_dns.clone(),
            ));
        }
        if !group.member_uids.is_empty() {
            attributes.push(("memberUid".to_string(), group.member_uids.clone()));
        }
        self.run_directory(DirectoryAction::Add {
            dn: group.dn.clone(),
            attributes,
        })
    }

    /// Groups are never disabled in the directory; access is revoked via
    /// the file-count quota of their directories.
    pub fn disable_group(&mut self, group: &DirectoryGroup) -> ReconcileResult<()> {
        info!(cn = %group.cn, "group disable is a no-op");
        Ok(())
    }

    pub fn update_group(&mut self, group: &DirectoryGroup, diff: &FieldDiff) -> ReconcileResult<()> {
        const CLASS: &str = DirectoryGroup::CLASS;
        let mut new_dn = None;
        let mut changes = Vec::new();
        for (field, value) in diff.iter() {
            let (attribute, shape) = match field {
                "dn" => {
                    new_dn = Some(expect_text(CLASS, field, value)?);
                    continue;
                }
                "cn" => ("cn", Shape::Text),
                "gid_number" => ("gidNumber", Shape::Number),
                "description" => ("description", Shape::Text),
                "owner_dn" => ("bih-groupOwnerDN", Shape::Text),
                "delegate_dns" => ("bih-groupDelegateDNs", Shape::List),
                "member_uids" => ("memberUid", Shape::List),
                _ => {
                    return Err(ReconcileError::UnknownDiffField {
                        class: CLASS,
                        field: field.to_string(),
                    });
                }
            };
            changes.push(attribute_change(CLASS, field, attribute, shape, value)?);
        }
        self.modify_entry(&group.dn, new_dn, changes)
    }

    /// Rename first, then modify the entry under its new name.
    fn modify_entry(
        &mut self,
        dn: &str,
        new_dn: Option<String>,
        changes: Vec<AttributeChange>,
    ) -> ReconcileResult<()> {
        let mut target = dn.to_string();
        if let Some(new_dn) = new_dn {
            self.run_directory(DirectoryAction::rename(dn, &new_dn))?;
            target = new_dn;
        }
        if !changes.is_empty() {
            self.run_directory(DirectoryAction::Modify {
                dn: target,
                changes,
            })?;
        }
        Ok(())
    }

    /// Create the directory with its mode, ownership, and quotas.
    pub fn create_directory(&mut self, directory: &StorageDirectory) -> ReconcileResult<()> {
        let mode = directory_mode(&directory.perms)?;
        let path = &directory.path;
        let mut actions = vec![
            FsAction::Mkdir {
                path: path.clone(),
                mode: mode.clone(),
            },
            FsAction::Chown {
                path: path.clone(),
                owner: directory.owner_name.clone(),
                group: Some(directory.group_name.clone()),
            },
            FsAction::Chmod {
                path: path.clone(),
                mode,
            },
        ];
        for (attribute, quota) in [
            (XATTR_QUOTA_BYTES, directory.quota_bytes),
            (XATTR_QUOTA_FILES, directory.quota_files),
        ] {
            if let Some(value) = quota {
                actions.push(FsAction::SetQuota {
                    path: path.clone(),
                    attribute: attribute.to_string(),
                    value,
                });
            }
        }
        for action in actions {
            self.run_filesystem(action)?;
        }
        Ok(())
    }

    /// Exhaust the file-count quota. Byte quota and permissions stay.
    pub fn disable_directory(&mut self, directory: &StorageDirectory) -> ReconcileResult<()> {
        if directory.quota_files == Some(0) {
            debug!(path = %directory.path, "directory already disabled");
            return Ok(());
        }
        self.run_filesystem(FsAction::SetQuota {
            path: directory.path.clone(),
            attribute: XATTR_QUOTA_FILES.to_string(),
            value: 0,
        })
    }

    pub fn update_directory(
        &mut self,
        directory: &StorageDirectory,
        diff: &FieldDiff,
    ) -> ReconcileResult<()> {
        const CLASS: &str = StorageDirectory::CLASS;
        let path = &directory.path;
        let mut owner = None;
        let mut group = None;
        let mut actions = Vec::new();
        for (field, value) in diff.iter() {
            match field {
                "owner_name" => {
                    owner = Some(expect_text(CLASS, field, value)?);
                }
                "owner_uid" => {
                    expect_number(CLASS, field, value)?;
                    owner.get_or_insert_with(|| directory.owner_name.clone());
                }
                "group_name" => {
                    group = Some(expect_text(CLASS, field, value)?);
                }
                "group_gid" => {
                    expect_number(CLASS, field, value)?;
                    group.get_or_insert_with(|| directory.group_name.clone());
                }
                "perms" => {
                    let perms = expect_text(CLASS, field, value)?;
                    actions.push(FsAction::Chmod {
                        path: path.clone(),
                        mode: directory_mode(&perms)?,
                    });
                }
                "quota_bytes" | "quota_files" => {
                    let attribute = if field == "quota_bytes" {
                        XATTR_QUOTA_BYTES
                    } else {
                        XATTR_QUOTA_FILES
                    }
                    .to_string();
                    actions.push(match value {
                        FieldValue::Null => FsAction::ClearQuota {
                            path: path.clone(),
                            attribute,
                        },
                        _ => FsAction::SetQuota {
                            path: path.clone(),
                            attribute,
                            value: expect_number(CLASS, field, value)?,
                        },
                    });
                }
                _ => {
                    return Err(ReconcileError::UnknownDiffField {
                        class: CLASS,
                        field: field.to_string(),
                    });
                }
            }
        }

        let ownership = match (owner, group) {
            (Some(owner), group) => Some(FsAction::Chown {
                path: path.clone(),
                owner,
                group,
            }),
            (None, Some(group)) => Some(FsAction::Chgrp {
                path: path.clone(),
                group,
            }),
            (None, None) => None,
        };
        for action in ownership.into_iter().chain(actions) {
            self.run_filesystem(action)?;
        }
        Ok(())
    }
}

/// Value shape an attribute expects.
#[derive(Debug, Clone, Copy)]
enum Shape {
    Text,
    Number,
    List,
    Gecos,
}

impl Shape {
    fn describe(self) -> &'static str {
        match self {
            Shape::Text => "text or null",
            Shape::Number => "a number or null",
            Shape::List => "a list",
            Shape::Gecos => "structured gecos or null",
        }
    }
}

fn attribute_change(
    class: &'static str,
    field: &str,
    attribute: &str,
    shape: Shape,
    value: &FieldValue,
) -> ReconcileResult<AttributeChange> {
    let values = match (shape, value) {
        (_, FieldValue::Null) => None,
        (Shape::Text, FieldValue::Text(text)) => Some(vec![text.clone()]),
        (Shape::Number, FieldValue::Number(number)) => Some(vec![number.to_string()]),
        (Shape::List, FieldValue::List(list)) if list.is_empty() => None,
        (Shape::List, FieldValue::List(list)) => Some(list.clone()),
        (Shape::Gecos, FieldValue::Gecos(gecos)) => Some(vec![gecos.render()]),
        _ => {
            return Err(ReconcileError::UnexpectedFieldValue {
                class,
                field: field.to_string(),
                expected: shape.describe(),
            });
        }
    };
    let attribute = attribute.to_string();
    Ok(match values {
        Some(values) => AttributeChange::Replace { attribute, values },
        None => AttributeChange::Clear { attribute },
    })
}

fn expect_text(class: &'static str, field: &str, value: &FieldValue) -> ReconcileResult<String> {
    match value {
        FieldValue::Text(text) => Ok(text.clone()),
        _ => Err(ReconcileError::UnexpectedFieldValue {
            class,
            field: field.to_string(),
            expected: "text",
        }),
    }
}

fn expect_number(class: &'static str, field: &str, value: &FieldValue) -> ReconcileResult<u64> {
    match value {
        FieldValue::Number(number) => Ok(*number),
        _ => Err(ReconcileError::UnexpectedFieldValue {
            class,
            field: field.to_string(),
            expected: "a number",
        }),
    }
}

fn directory_mode(perms: &str) -> ReconcileResult<String> {
    symbolic_mode(perms).ok_or_else(|| ReconcileError::UnexpectedFieldValue {
        class: StorageDirectory::CLASS,
        field: "perms".to_string(),
        expected: "a ten-character permission string",
    })
}

fn object_classes(classes: &[&str]) -> Vec<(String, Vec<String>)> {
    vec![(
        "objectClass".to_string(),
        classes.iter().map(|class| class.to_string()).collect(),
    )]
}

fn push_attr(attributes: &mut Vec<(String, Vec<String>)>, name: &str, value: Option<&String>) {
    if let Some(value) = value {
        attributes.push((name.to_string(), vec![value.clone()]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::compare_states;
    use crate::conventions::LOGIN_SHELL_DEFAULT;
    use crate::fixtures::{account, directory, group};
    use crate::operation::OpKind;
    use crate::state::SystemState;
    use std::convert::Infallible;

    #[derive(Debug)]
    struct Recording<A> {
        actions: Vec<A>,
    }

    impl<A> Default for Recording<A> {
        fn default() -> Self {
            Self {
                actions: Vec::new(),
            }
        }
    }

    impl DirectoryWriter for Recording<DirectoryAction> {
        type Error = Infallible;

        fn execute(&mut self, action: &DirectoryAction) -> Result<(), Self::Error> {
            self.actions.push(action.clone());
            Ok(())
        }
    }

    impl FilesystemWriter for Recording<FsAction> {
        type Error = Infallible;

        fn execute(&mut self, action: &FsAction) -> Result<(), Self::Error> {
            self.actions.push(action.clone());
            Ok(())
        }
    }

    type TestExecutor = Executor<Recording<DirectoryAction>, Recording<FsAction>>;

    fn executor(options: ExecutionOptions) -> TestExecutor {
        Executor::new(Recording::default(), Recording::default(), options)
    }

    fn live() -> ExecutionOptions {
        ExecutionOptions::default()
    }

    #[test]
    fn disabling_a_vanished_account_only_changes_its_shell() {
        let current = SystemState::from_entities([account("alice", Some(1100))], [], []);
        let ops = compare_states(&current, &SystemState::default());
        assert_eq!(ops.accounts.len(), 1);
        assert_eq!(ops.accounts[0].kind(), OpKind::Disable);
        assert_eq!(ops.accounts[0].entity().login_shell, LOGIN_SHELL_DEFAULT);

        let mut exec = executor(live());
        exec.apply(&ops).expect("apply");
        let (directory, filesystem, report) = exec.into_parts();
        assert_eq!(
            directory.actions,
            vec![DirectoryAction::Modify {
                dn: current.accounts["alice"].dn.clone(),
                changes: vec![AttributeChange::Replace {
                    attribute: "loginShell".into(),
                    values: vec![LOGIN_SHELL_DISABLED.into()],
                }],
            }]
        );
        assert!(filesystem.actions.is_empty());
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn already_disabled_entities_need_no_action() {
        let mut alice = account("alice", Some(1100));
        alice.login_shell = LOGIN_SHELL_DISABLED.to_string();
        let mut dir = directory("/data/cephfs-1/work/groups/ag-foo", "alice", "hpc-ag-foo", 1100);
        dir.quota_files = Some(0);
        let current = SystemState::from_entities([alice], [group("hpc-ag-foo", 1100)], [dir]);

        let mut exec = executor(live());
        exec.apply(&compare_states(&current, &SystemState::default()))
            .expect("apply");
        let report = exec.report();
        assert_eq!(report.noop, 3);
        assert_eq!(report.applied, 0);
        assert!(report.actions.is_empty());
    }

    #[test]
    fn dry_run_renders_actions_without_executing_them() {
        let desired = SystemState::from_entities(
            [account("alice", Some(1100))],
            [group("hpc-ag-foo", 1100)],
            [directory("/data/cephfs-1/work/groups/ag-foo", "alice", "hpc-ag-foo", 1100)],
        );
        let ops = compare_states(&SystemState::default(), &desired);
        let mut exec = Executor::new(
            ReadOnly,
            ReadOnly,
            ExecutionOptions {
                dry_run: true,
                ..ExecutionOptions::default()
            },
        );
        exec.apply(&ops).expect("dry run must not touch the writers");
        let report = exec.report();
        assert!(report.dry_run);
        assert_eq!(report.applied, 3);
        assert!(report.actions[0].starts_with("ldapadd"));
        assert!(report.actions[0].contains("cn=hpc-ag-foo"));
        assert!(report.actions[1].contains("uid=alice"));
        assert!(report.actions[2].starts_with("mkdir"));
    }

    #[test]
    fn read_only_writer_refuses_live_execution() {
        let desired = SystemState::from_entities([], [group("hpc-ag-foo", 1100)], []);
        let mut exec = Executor::new(ReadOnly, ReadOnly, live());
        let err = exec
            .apply(&compare_states(&SystemState::default(), &desired))
            .expect_err("read-only writer must fail");
        assert!(matches!(
            err,
            ReconcileError::Collaborator {
                system: "directory service",
                ..
            }
        ));
    }

    #[test]
    fn filters_skip_operation_kinds() {
        let current = SystemState::from_entities([account("bob", None)], [], []);
        let desired = SystemState::from_entities([account("carol", None)], [], []);
        let mut exec = executor(ExecutionOptions {
            account_ops: [OpKind::Create].into_iter().collect(),
            ..ExecutionOptions::default()
        });
        exec.apply(&compare_states(&current, &desired)).expect("apply");
        let (directory, _, report) = exec.into_parts();
        assert_eq!(report.filtered, 1);
        assert_eq!(report.applied, 1);
        assert!(matches!(&directory.actions[..], [DirectoryAction::Add { .. }]));
    }

    #[test]
    fn directory_creation_sets_mode_owner_and_quotas() {
        let mut dir = directory("/data/cephfs-1/work/groups/ag-foo", "alice", "hpc-ag-foo", 1100);
        dir.quota_bytes = Some(2 * 1024_u64.pow(4));
        let mut exec = executor(live());
        exec.create_directory(&dir).expect("create");
        insta::assert_snapshot!(exec.report().actions.join("\n"), @r"
        mkdir -v -p -m u=rwx,u-s,g=rws,o=,o-t /data/cephfs-1/work/groups/ag-foo
        chown -c alice:hpc-ag-foo /data/cephfs-1/work/groups/ag-foo
        chmod -c u=rwx,u-s,g=rws,o=,o-t /data/cephfs-1/work/groups/ag-foo
        setfattr -n ceph.quota.max_bytes -v 2199023255552 /data/cephfs-1/work/groups/ag-foo
        ");
    }

    #[test]
    fn directory_update_merges_ownership_and_clears_null_quota() {
        let dir = directory("/data/cephfs-1/home/users/alice", "alice", "hpc-alumnis", 1_030_001);
        let diff: FieldDiff = [
            ("owner_uid".to_string(), FieldValue::Number(4001)),
            ("group_name".to_string(), FieldValue::Text("hpc-ag-foo".into())),
            ("group_gid".to_string(), FieldValue::Number(1100)),
            ("quota_bytes".to_string(), FieldValue::Null),
            ("quota_files".to_string(), FieldValue::Number(10)),
        ]
        .into_iter()
        .collect();
        let mut exec = executor(live());
        exec.update_directory(&dir, &diff).expect("update");
        insta::assert_snapshot!(exec.report().actions.join("\n"), @r"
        chown -c alice:hpc-ag-foo /data/cephfs-1/home/users/alice
        setfattr -x ceph.quota.max_bytes /data/cephfs-1/home/users/alice
        setfattr -n ceph.quota.max_files -v 10 /data/cephfs-1/home/users/alice
        ");
    }

    #[test]
    fn directory_disable_exhausts_file_quota() {
        let dir = directory("/data/cephfs-2/mirrored/projects/atlas", "alice", "hpc-prj-atlas", 1200);
        let mut exec = executor(live());
        exec.disable_directory(&dir).expect("disable");
        let (_, filesystem, _) = exec.into_parts();
        assert_eq!(
            filesystem.actions,
            vec![FsAction::SetQuota {
                path: dir.path.clone(),
                attribute: XATTR_QUOTA_FILES.into(),
                value: 0,
            }]
        );
    }

    #[test]
    fn account_rename_precedes_modifications() {
        let alice = account("alice", Some(1100));
        let diff: FieldDiff = [
            (
                "dn".to_string(),
                FieldValue::Text("cn=Alice Doe,ou=MDC,ou=Users,dc=hpc,dc=bihealth,dc=org".into()),
            ),
            ("ssh_public_key".to_string(), FieldValue::List(Vec::new())),
            ("mail".to_string(), FieldValue::Null),
        ]
        .into_iter()
        .collect();
        let mut exec = executor(live());
        exec.update_account(&alice, &diff).expect("update");
        insta::assert_snapshot!(exec.report().actions.join("\n"), @r"
        ldapmodrdn -r cn=alice,ou=Charite,ou=Users,dc=hpc,dc=bihealth,dc=org 'cn=Alice Doe' -s ou=MDC,ou=Users,dc=hpc,dc=bihealth,dc=org
        ldapmodify 'cn=Alice Doe,ou=MDC,ou=Users,dc=hpc,dc=bihealth,dc=org' delete:mail delete:sshPublicKey
        ");
    }

    #[test]
    fn contract_violations_are_fatal() {
        let alice = account("alice", Some(1100));
        let mut exec = executor(live());

        let immutable: FieldDiff = [("uid_number".to_string(), FieldValue::Number(1))]
            .into_iter()
            .collect();
        assert!(matches!(
            exec.update_account(&alice, &immutable),
            Err(ReconcileError::ImmutableField { .. })
        ));

        let unknown: FieldDiff = [("favourite_colour".to_string(), FieldValue::Null)]
            .into_iter()
            .collect();
        assert!(matches!(
            exec.update_group(&group("hpc-ag-foo", 1), &unknown),
            Err(ReconcileError::UnknownDiffField { class: "group", .. })
        ));

        let wrong_shape: FieldDiff = [("gid_number".to_string(), FieldValue::Text("x".into()))]
            .into_iter()
            .collect();
        assert!(matches!(
            exec.update_account(&alice, &wrong_shape),
            Err(ReconcileError::UnexpectedFieldValue { .. })
        ));

        let path_change: FieldDiff = [("path".to_string(), FieldValue::Text("/tmp".into()))]
            .into_iter()
            .collect();
        let dir = directory("/data/cephfs-1/work/groups/ag-foo", "alice", "hpc-ag-foo", 1100);
        assert!(matches!(
            exec.update_directory(&dir, &path_change),
            Err(ReconcileError::UnknownDiffField { class: "directory", .. })
        ));
        assert!(exec.report().actions.is_empty());
    }
}
