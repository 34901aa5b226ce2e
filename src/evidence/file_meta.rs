//! Permission and ownership checks on node files.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::unistd::{Gid, Group, Uid, User};
use tracing::debug;

use super::{Evidence, FileCheck, Inconclusive};

/// Mask of the permission bits compared against a maximum mode.
const MODE_BITS: u32 = 0o7777;

/// Evaluate `check` against the file at `path`.
///
/// A missing or unreadable file is [`Inconclusive::SourceUnavailable`];
/// metadata that violates the check is [`Evidence::Refuted`].
pub fn check(path: &Path, check: &FileCheck) -> Evidence {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "file metadata unavailable");
            return Evidence::Inconclusive(Inconclusive::SourceUnavailable(format!(
                "{}: {e}",
                path.display()
            )));
        }
    };

    match check {
        FileCheck::Permissions { max_mode } => {
            let mode = meta.mode() & MODE_BITS;
            if mode & !max_mode == 0 {
                Evidence::Matched
            } else {
                Evidence::Refuted(format!(
                    "{} has mode {mode:o}, more permissive than {max_mode:o}",
                    path.display()
                ))
            }
        }
        FileCheck::Ownership { user, group } => {
            let owner = user_name(meta.uid());
            let owning_group = group_name(meta.gid());
            if owner == *user && owning_group == *group {
                Evidence::Matched
            } else {
                Evidence::Refuted(format!(
                    "{} is owned by {owner}:{owning_group}, expected {user}:{group}",
                    path.display()
                ))
            }
        }
    }
}

/// Account name for `uid`, falling back to the number when unresolvable.
fn user_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ if uid == 0 => "root".to_owned(),
        _ => uid.to_string(),
    }
}

fn group_name(gid: u32) -> String {
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => group.name,
        _ if gid == 0 => "root".to_owned(),
        _ => gid.to_string(),
    }
}
