use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use super::SyncError;
use crate::storage::StorageError;

#[test]
fn non_fast_forward_is_detected_from_push_stderr() {
    let rejected = SyncError::GitCommandFailed {
        command: "git push origin main".to_string(),
        code: Some(1),
        stderr: "! [rejected] main -> main (fetch first)".to_string(),
    };
    assert!(rejected.is_non_fast_forward());
    assert!(!rejected.is_timeout());

    let other = SyncError::GitCommandFailed {
        command: "git push origin main".to_string(),
        code: Some(128),
        stderr: "fatal: unable to access".to_string(),
    };
    assert!(!other.is_non_fast_forward());
}

#[test]
fn sync_error_display_source_and_from_cover_all_variants() {
    let io: SyncError = std::io::Error::other("disk").into();
    assert!(io.to_string().contains("I/O error"));
    assert!(io.source().is_some());

    let storage: SyncError = StorageError::io(
        std::path::Path::new("/tmp/.gitignore"),
        std::io::Error::other("denied"),
    )
    .into();
    assert!(storage.to_string().contains("storage error"));
    assert!(storage.source().is_some());

    let not_repo = SyncError::NotARepository(PathBuf::from("/tmp/data"));
    assert!(not_repo.to_string().contains("not a git repository"));
    assert!(not_repo.source().is_none());

    let no_remote = SyncError::NoRemote;
    assert!(no_remote.to_string().contains("no git remote"));

    let unavailable = SyncError::GitUnavailable;
    assert!(unavailable.to_string().contains("git CLI is not installed"));
    assert!(unavailable.source().is_none());

    let timeout = SyncError::Timeout {
        command: "git push".to_string(),
        after: Duration::from_secs(120),
    };
    assert!(timeout.is_timeout());
    assert!(timeout.to_string().contains("timed out after 120s"));
    assert!(timeout.source().is_none());

    let failed = SyncError::GitCommandFailed {
        command: "git commit".to_string(),
        code: Some(1),
        stderr: "bad".to_string(),
    };
    assert!(failed.to_string().contains("git command failed"));
    assert!(failed.source().is_none());

    let rejected = SyncError::PushRejected {
        remote: "origin".to_string(),
        branch: "main".to_string(),
    };
    assert!(rejected.to_string().contains("origin/main was rejected"));
    assert!(!rejected.is_non_fast_forward());
    assert!(rejected.source().is_none());
}
