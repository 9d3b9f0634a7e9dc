//! Conversion of raw search entries into directory entities.

use crate::LdapError;
use hpc_access_core::{DirectoryAccount, DirectoryGroup, Gecos};
use std::collections::HashMap;

/// Case-insensitive view over the attributes of one entry.
struct Attrs<'a> {
    dn: &'a str,
    map: &'a HashMap<String, Vec<String>>,
}

impl<'a> Attrs<'a> {
    fn values(&self, name: &str) -> Option<&'a Vec<String>> {
        self.map
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }

    fn first(&self, name: &str) -> Option<String> {
        self.values(name)
            .and_then(|values| values.first())
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.values(name).cloned().unwrap_or_default()
    }

    fn required(&self, name: &'static str) -> Result<String, LdapError> {
        self.first(name).ok_or_else(|| LdapError::MissingAttribute {
            dn: self.dn.to_string(),
            attribute: name,
        })
    }

    fn number(&self, name: &'static str) -> Result<Option<u32>, LdapError> {
        self.first(name)
            .map(|value| {
                value.trim().parse().map_err(|_| LdapError::InvalidNumber {
                    dn: self.dn.to_string(),
                    attribute: name,
                    value,
                })
            })
            .transpose()
    }

    fn required_number(&self, name: &'static str) -> Result<u32, LdapError> {
        self.number(name)?.ok_or_else(|| LdapError::MissingAttribute {
            dn: self.dn.to_string(),
            attribute: name,
        })
    }
}

/// Build an account from a `posixAccount` entry.
pub fn account_from_attrs(
    dn: &str,
    map: &HashMap<String, Vec<String>>,
) -> Result<DirectoryAccount, LdapError> {
    let attrs = Attrs { dn, map };
    Ok(DirectoryAccount {
        dn: dn.to_string(),
        cn: attrs.required("cn")?,
        uid: attrs.required("uid")?,
        mail: attrs.first("mail"),
        sn: attrs.first("sn"),
        given_name: attrs.first("givenName"),
        uid_number: attrs.required_number("uidNumber")?,
        gid_number: attrs.number("gidNumber")?,
        home_directory: attrs.required("homeDirectory")?,
        login_shell: attrs.required("loginShell")?,
        gecos: attrs.first("gecos").map(|raw| Gecos::parse(&raw)),
        ssh_public_key: attrs.list("sshPublicKey"),
    })
}

/// Build a group from a `posixGroup` entry. `memberUid` is sorted so the
/// comparison does not depend on server ordering.
pub fn group_from_attrs(
    dn: &str,
    map: &HashMap<String, Vec<String>>,
) -> Result<DirectoryGroup, LdapError> {
    let attrs = Attrs { dn, map };
    let mut member_uids = attrs.list("memberUid");
    member_uids.sort();
    member_uids.dedup();
    Ok(DirectoryGroup {
        dn: dn.to_string(),
        cn: attrs.required("cn")?,
        gid_number: attrs.required_number("gidNumber")?,
        description: attrs.first("description"),
        owner_dn: attrs.first("bih-groupOwnerDN"),
        delegate_dns: attrs.list("bih-groupDelegateDNs"),
        member_uids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect()
    }

    const ALICE_DN: &str = "cn=Alice Doe,ou=Charite,ou=Users,dc=hpc,dc=bihealth,dc=org";

    #[test]
    fn account_parses_with_case_insensitive_names() {
        let map = attrs(&[
            ("cn", &["Alice Doe"]),
            ("uid", &["alice_c"]),
            ("uidnumber", &["2001"]),
            ("GIDNUMBER", &["1007"]),
            ("homeDirectory", &["/data/cephfs-1/home/users/alice_c"]),
            ("loginShell", &["/usr/bin/bash"]),
            ("gecos", &["Alice Doe,,+49 30 1234,,"]),
            ("sshPublicKey", &["ssh-ed25519 AAAA one", "ssh-ed25519 BBBB two"]),
            ("mail", &["alice@example.org"]),
        ]);
        let account = account_from_attrs(ALICE_DN, &map).expect("account should parse");
        assert_eq!(account.uid, "alice_c");
        assert_eq!(account.uid_number, 2001);
        assert_eq!(account.gid_number, Some(1007));
        assert_eq!(account.sn, None);
        assert_eq!(account.mail.as_deref(), Some("alice@example.org"));
        let gecos = account.gecos.expect("gecos");
        assert_eq!(gecos.office_phone.as_deref(), Some("+49 30 1234"));
        assert_eq!(account.ssh_public_key.len(), 2);
    }

    #[test]
    fn account_without_gid_is_accepted() {
        let map = attrs(&[
            ("cn", &["Alice Doe"]),
            ("uid", &["alice_c"]),
            ("uidNumber", &["2001"]),
            ("homeDirectory", &["/home/alice_c"]),
            ("loginShell", &["/usr/sbin/nologin"]),
        ]);
        let account = account_from_attrs(ALICE_DN, &map).expect("account should parse");
        assert_eq!(account.gid_number, None);
        assert!(account.is_disabled());
        assert!(account.ssh_public_key.is_empty());
    }

    #[test]
    fn account_missing_uid_number_is_an_integrity_error() {
        let map = attrs(&[
            ("cn", &["Alice Doe"]),
            ("uid", &["alice_c"]),
            ("homeDirectory", &["/home/alice_c"]),
            ("loginShell", &["/usr/bin/bash"]),
        ]);
        let err = account_from_attrs(ALICE_DN, &map).expect_err("uidNumber is required");
        assert!(matches!(
            err,
            LdapError::MissingAttribute {
                attribute: "uidNumber",
                ..
            }
        ));
    }

    #[test]
    fn non_numeric_gid_is_rejected() {
        let map = attrs(&[("cn", &["hpc-ag-doe"]), ("gidNumber", &["lots"])]);
        let err = group_from_attrs("cn=hpc-ag-doe,ou=Teams", &map).expect_err("not a number");
        assert!(err.to_string().contains("lots"));
    }

    #[test]
    fn group_sorts_member_uids() {
        let map = attrs(&[
            ("cn", &["hpc-prj-x"]),
            ("gidNumber", &["1010"]),
            ("bih-groupOwnerDN", &[ALICE_DN]),
            ("memberUid", &["zoe_c", "alice_c", "zoe_c"]),
        ]);
        let group = group_from_attrs("cn=hpc-prj-x,ou=Projects", &map).expect("group should parse");
        assert_eq!(group.gid_number, 1010);
        assert_eq!(group.owner_dn.as_deref(), Some(ALICE_DN));
        assert!(group.delegate_dns.is_empty());
        assert_eq!(group.member_uids, vec!["alice_c", "zoe_c"]);
    }
}
