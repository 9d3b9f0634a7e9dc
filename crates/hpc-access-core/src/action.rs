//! Primitive actions the writers execute.
//!
//! Every action renders as the administrative command it is equivalent to;
//! that rendering is what the audit log shows.

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// One attribute modification inside an `ldapmodify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum AttributeChange {
    Replace {
        attribute: String,
        values: Vec<String>,
    },
    /// Remove every value of the attribute.
    Clear { attribute: String },
}

/// A directory-service write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DirectoryAction {
    Add {
        dn: String,
        attributes: Vec<(String, Vec<String>)>,
    },
    Modify {
        dn: String,
        changes: Vec<AttributeChange>,
    },
    Rename {
        dn: String,
        new_rdn: String,
        new_superior: Option<String>,
    },
}

impl DirectoryAction {
    /// Rename `dn` to `new_dn`, moving it only when the parent changes.
    pub fn rename(dn: &str, new_dn: &str) -> Self {
        let (_, old_parent) = split_dn(dn);
        let (new_rdn, new_parent) = split_dn(new_dn);
        DirectoryAction::Rename {
            dn: dn.to_string(),
            new_rdn: new_rdn.to_string(),
            new_superior: (!new_parent.eq_ignore_ascii_case(old_parent))
                .then(|| new_parent.to_string()),
        }
    }
}

impl fmt::Display for DirectoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryAction::Add { dn, attributes } => {
                write!(f, "ldapadd {}", shell_quote(dn))?;
                for (attribute, values) in attributes {
                    for value in values {
                        write!(f, " {}", shell_quote(&format!("{attribute}={value}")))?;
                    }
                }
                Ok(())
            }
            DirectoryAction::Modify { dn, changes } => {
                write!(f, "ldapmodify {}", shell_quote(dn))?;
                for change in changes {
                    match change {
                        AttributeChange::Replace { attribute, values } => {
                            let joined = values.join(";");
                            write!(
                                f,
                                " {}",
                                shell_quote(&format!("replace:{attribute}={joined}"))
                            )?;
                        }
                        AttributeChange::Clear { attribute } => {
                            write!(f, " delete:{attribute}")?;
                        }
                    }
                }
                Ok(())
            }
            DirectoryAction::Rename {
                dn,
                new_rdn,
                new_superior,
            } => {
                write!(f, "ldapmodrdn -r {} {}", shell_quote(dn), shell_quote(new_rdn))?;
                if let Some(superior) = new_superior {
                    write!(f, " -s {}", shell_quote(superior))?;
                }
                Ok(())
            }
        }
    }
}

/// A filesystem write, equivalent to one command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FsAction {
    Mkdir {
        path: String,
        mode: String,
    },
    Chown {
        path: String,
        owner: String,
        group: Option<String>,
    },
    Chgrp {
        path: String,
        group: String,
    },
    Chmod {
        path: String,
        mode: String,
    },
    SetQuota {
        path: String,
        attribute: String,
        value: u64,
    },
    /// Remove the quota attribute, lifting the limit.
    ClearQuota {
        path: String,
        attribute: String,
    },
}

impl FsAction {
    pub fn path(&self) -> &str {
        match self {
            FsAction::Mkdir { path, .. }
            | FsAction::Chown { path, .. }
            | FsAction::Chgrp { path, .. }
            | FsAction::Chmod { path, .. }
            | FsAction::SetQuota { path, .. }
            | FsAction::ClearQuota { path, .. } => path,
        }
    }

    /// Same action against `root` joined with the path.
    pub fn relocated(&self, root: &str) -> Self {
        let mut action = self.clone();
        if root.is_empty() {
            return action;
        }
        let relocated = format!("{}{}", root.trim_end_matches('/'), self.path());
        match &mut action {
            FsAction::Mkdir { path, .. }
            | FsAction::Chown { path, .. }
            | FsAction::Chgrp { path, .. }
            | FsAction::Chmod { path, .. }
            | FsAction::SetQuota { path, .. }
            | FsAction::ClearQuota { path, .. } => *path = relocated,
        }
        action
    }

    /// Program and arguments that perform the action.
    pub fn argv(&self) -> Vec<String> {
        let argv: Vec<&str> = match self {
            FsAction::Mkdir { path, mode } => {
                vec!["mkdir", "-v", "-p", "-m", mode.as_str(), path.as_str()]
            }
            FsAction::Chown { path, owner, group } => {
                let spec = match group {
                    Some(group) => format!("{owner}:{group}"),
                    None => owner.clone(),
                };
                return vec!["chown".into(), "-c".into(), spec, path.clone()];
            }
            FsAction::Chgrp { path, group } => vec!["chgrp", "-c", group.as_str(), path.as_str()],
            FsAction::Chmod { path, mode } => vec!["chmod", "-c", mode.as_str(), path.as_str()],
            FsAction::SetQuota {
                path,
                attribute,
                value,
            } => {
                return vec![
                    "setfattr".into(),
                    "-n".into(),
                    attribute.clone(),
                    "-v".into(),
                    value.to_string(),
                    path.clone(),
                ];
            }
            FsAction::ClearQuota { path, attribute } => {
                vec!["setfattr", "-x", attribute.as_str(), path.as_str()]
            }
        };
        argv.into_iter().map(str::to_string).collect()
    }
}

impl fmt::Display for FsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .argv()
            .iter()
            .map(|arg| shell_quote(arg).into_owned())
            .collect();
        f.write_str(&rendered.join(" "))
    }
}

/// Render an `ls -l` permission string as an explicit symbolic mode.
///
/// Set-id and sticky bits are always named, so applying the mode clears
/// them when they are not wanted: `drwxrwS---` becomes
/// `u=rwx,u-s,g=rws,o=,o-t`. Returns `None` for malformed input.
pub fn symbolic_mode(perms: &str) -> Option<String> {
    let chars: Vec<char> = perms.chars().collect();
    if chars.len() != 10 {
        return None;
    }
    let classes = [
        ('u', 's', &chars[1..4]),
        ('g', 's', &chars[4..7]),
        ('o', 't', &chars[7..10]),
    ];
    let mut parts = Vec::with_capacity(3);
    for (class, special_bit, triple) in classes {
        let mut bits = String::new();
        match triple[0] {
            'r' => bits.push('r'),
            '-' => {}
            _ => return None,
        }
        match triple[1] {
            'w' => bits.push('w'),
            '-' => {}
            _ => return None,
        }
        let special = match (triple[2], special_bit) {
            ('x', _) => {
                bits.push('x');
                false
            }
            ('-', _) => false,
            ('s', 's') | ('t', 't') => {
                bits.push('x');
                true
            }
            ('S', 's') | ('T', 't') => true,
            _ => return None,
        };
        if special {
            parts.push(format!("{class}={bits}{special_bit}"));
        } else {
            parts.push(format!("{class}={bits},{class}-{special_bit}"));
        }
    }
    Some(parts.join(","))
}

/// Split a DN into its first RDN and the parent DN.
fn split_dn(dn: &str) -> (&str, &str) {
    let bytes = dn.as_bytes();
    let mut escaped = false;
    for (idx, byte) in bytes.iter().enumerate() {
        match byte {
            b'\\' if !escaped => escaped = true,
            b',' if !escaped => return (&dn[..idx], &dn[idx + 1..]),
            _ => escaped = false,
        }
    }
    (dn, "")
}

fn shell_quote(raw: &str) -> Cow<'_, str> {
    let safe = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if safe {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(format!("'{}'", raw.replace('\'', r"'\''")))
    }
}
