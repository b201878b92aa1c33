use anyhow::Result;
use foam::config::Config;
use foam::hash::hash_bytes;
use foam::lock::FolderLock;
use foam::manifest::ManifestStore;
use foam::walker::TreeWalker;
use foam::{ErrorKind, LOCKS_DIR, MANIFESTS_DIR};
use std::fs;
use std::time::Duration;

mod common;
use common::{TestEnv, test_config, tree_listing, write_file};

#[test]
fn test_reset_restores_deleted_and_removes_created_files() -> Result<()> {
    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a.txt", "hello")?;

    env.foam.track(&[&f]).remove(&f).unwrap()?;
    fs::remove_file(f.join("a.txt"))?;
    write_file(&f, "b.txt", "world")?;

    env.foam.reset(&[&f]).remove(&f).unwrap()?;
    assert_eq!(
        tree_listing(&f)?,
        vec![("a.txt".to_string(), "file:hello".to_string())]
    );
    Ok(())
}

#[test]
fn test_reset_recreates_empty_directory() -> Result<()> {
    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    fs::create_dir(f.join("sub"))?;

    env.foam.track(&[&f]).remove(&f).unwrap()?;
    fs::remove_dir(f.join("sub"))?;

    let report = env.foam.reset(&[&f]).remove(&f).unwrap()?;
    assert_eq!(report.dirs_created, 1);
    assert!(f.join("sub").is_dir());
    assert_eq!(fs::read_dir(f.join("sub"))?.count(), 0);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_reset_repoints_symlink() -> Result<()> {
    use std::os::unix::fs::symlink;

    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "target", "t")?;
    write_file(&f, "elsewhere", "e")?;
    symlink("target", f.join("link"))?;

    env.foam.track(&[&f]).remove(&f).unwrap()?;
    fs::remove_file(f.join("link"))?;
    symlink("elsewhere", f.join("link"))?;

    env.foam.reset(&[&f]).remove(&f).unwrap()?;
    assert_eq!(fs::read_link(f.join("link"))?, std::path::PathBuf::from("target"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_reset_removes_special_files_created_after_tracking() -> Result<()> {
    use std::os::unix::net::UnixListener;

    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a.txt", "hello")?;
    env.foam.track(&[&f]).remove(&f).unwrap()?;

    fs::create_dir(f.join("newdir"))?;
    drop(UnixListener::bind(f.join("newdir").join("sock"))?);
    drop(UnixListener::bind(f.join("topsock"))?);

    let report = env.foam.reset(&[&f]).remove(&f).unwrap()?;
    assert_eq!(report.files_removed, 2);
    assert_eq!(report.dirs_removed, 1);
    assert_eq!(
        tree_listing(&f)?,
        vec![("a.txt".to_string(), "file:hello".to_string())]
    );
    assert!(env.foam.status(&f)?.is_empty());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_special_file_present_at_track_time_is_left_alone() -> Result<()> {
    use std::os::unix::net::UnixListener;

    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a.txt", "hello")?;
    drop(UnixListener::bind(f.join("sock"))?);
    env.foam.track(&[&f]).remove(&f).unwrap()?;

    assert!(env.foam.status(&f)?.is_empty());
    fs::remove_file(f.join("sock"))?;
    env.foam.reset(&[&f]).remove(&f).unwrap()?;
    assert!(!f.join("sock").exists());
    assert!(env.foam.status(&f)?.is_empty());
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn test_retrack_with_non_utf8_name_keeps_previous_capture() -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a.txt", "hello")?;
    let first = env.foam.track(&[&f]).remove(&f).unwrap()?;

    fs::write(f.join(OsStr::from_bytes(b"bad\xff")), "x")?;
    let err = env.foam.track(&[&f]).remove(&f).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Access);

    let tracked = env.foam.list_tracked()?;
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].folder, f);
    assert_eq!(tracked[0].manifest, first.manifest);
    Ok(())
}

#[test]
fn test_reset_after_undo_is_not_found_and_leaves_folder_alone() -> Result<()> {
    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a.txt", "hello")?;
    env.foam.track(&[&f]).remove(&f).unwrap()?;

    let undo = env.foam.undo()?;
    assert_eq!(undo.cleared, vec![f.clone()]);
    assert_eq!(env.blob_count()?, 0);

    write_file(&f, "new.txt", "untouched")?;
    let err = env.foam.reset(&[&f]).remove(&f).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(tree_listing(&f)?.len(), 2);
    Ok(())
}

#[test]
fn test_tracking_unchanged_folder_is_idempotent() -> Result<()> {
    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a.txt", "alpha")?;
    write_file(&f, "nested/b.txt", "beta")?;
    let manifests = ManifestStore::new(env.store_dir.join(MANIFESTS_DIR), 3);

    let first = env.foam.track(&[&f]).remove(&f).unwrap()?;
    let first_digest = manifests.load(&first.manifest)?.tree_digest()?;
    let blobs = env.blob_count()?;

    let second = env.foam.track(&[&f]).remove(&f).unwrap()?;
    assert_eq!(second.new_blobs, 0);
    assert_eq!(manifests.load(&second.manifest)?.tree_digest()?, first_digest);
    assert_eq!(env.blob_count()?, blobs);
    Ok(())
}

#[test]
fn test_identical_files_share_one_blob() -> Result<()> {
    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "one.txt", "same bytes")?;
    write_file(&f, "deep/two.txt", "same bytes")?;

    let summary = env.foam.track(&[&f]).remove(&f).unwrap()?;
    assert_eq!(summary.new_blobs, 1);
    assert_eq!(env.blob_count()?, 1);
    Ok(())
}

#[test]
fn test_identical_files_across_folders_share_one_blob() -> Result<()> {
    let env = TestEnv::new()?;
    let a = env.folder("a")?;
    let b = env.folder("b")?;
    write_file(&a, "x", "shared")?;
    write_file(&b, "y", "shared")?;

    let results = env.foam.track(&[&a, &b]);
    assert!(results.values().all(Result::is_ok));
    assert_eq!(env.blob_count()?, 1);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_round_trip_restores_contents_and_modes() -> Result<()> {
    use common::{mode_of, set_mode};

    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "bin/run.sh", "#!/bin/sh\necho hi\n")?;
    write_file(&f, "docs/readme", "read me")?;
    write_file(&f, "private", "secret")?;
    set_mode(&f.join("bin/run.sh"), 0o755)?;
    set_mode(&f.join("private"), 0o600)?;
    set_mode(&f.join("docs"), 0o750)?;
    let before = tree_listing(&f)?;

    env.foam.track(&[&f]).remove(&f).unwrap()?;

    fs::remove_dir_all(f.join("bin"))?;
    write_file(&f, "docs/readme", "rewritten")?;
    write_file(&f, "docs/extra/notes", "more")?;
    set_mode(&f.join("private"), 0o644)?;
    set_mode(&f.join("docs"), 0o755)?;
    fs::remove_file(f.join("private"))?;
    fs::create_dir(f.join("private"))?;

    env.foam.reset(&[&f]).remove(&f).unwrap()?;

    assert_eq!(tree_listing(&f)?, before);
    assert_eq!(mode_of(&f.join("bin/run.sh"))?, 0o755);
    assert_eq!(mode_of(&f.join("private"))?, 0o600);
    assert_eq!(mode_of(&f.join("docs"))?, 0o750);
    assert!(env.foam.status(&f)?.is_empty());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_reset_inside_read_only_directory() -> Result<()> {
    use common::{mode_of, set_mode};

    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "ro/kept", "k")?;
    set_mode(&f.join("ro"), 0o555)?;
    env.foam.track(&[&f]).remove(&f).unwrap()?;

    set_mode(&f.join("ro"), 0o755)?;
    fs::remove_file(f.join("ro/kept"))?;
    write_file(&f, "ro/stray", "s")?;
    set_mode(&f.join("ro"), 0o555)?;

    let outcome = env.foam.reset(&[&f]).remove(&f).unwrap();
    let mode = mode_of(&f.join("ro"))?;
    set_mode(&f.join("ro"), 0o755)?;
    outcome?;

    assert_eq!(mode, 0o555);
    assert_eq!(fs::read_to_string(f.join("ro/kept"))?, "k");
    assert!(!f.join("ro/stray").exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_permissions_not_preserved_when_disabled() -> Result<()> {
    use common::{mode_of, set_mode};

    let mut config = test_config();
    config.restore.preserve_permissions = false;
    let env = TestEnv::with_config(config)?;
    let f = env.folder("f")?;
    write_file(&f, "file", "x")?;
    set_mode(&f.join("file"), 0o600)?;
    env.foam.track(&[&f]).remove(&f).unwrap()?;

    set_mode(&f.join("file"), 0o640)?;
    let report = env.foam.reset(&[&f]).remove(&f).unwrap()?;
    assert_eq!(report.modes_set, 0);
    assert_eq!(mode_of(&f.join("file"))?, 0o640);
    Ok(())
}

#[test]
fn test_failure_in_one_folder_does_not_block_others() -> Result<()> {
    let env = TestEnv::new()?;
    let good = env.folder("good")?;
    write_file(&good, "a", "a")?;
    let missing = env.work_dir.join("missing");

    let results = env.foam.track(&[&good, &missing]);
    assert_eq!(results.len(), 2);
    assert!(results[&good].is_ok());
    let err = results[&missing].as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(env.foam.list_tracked()?.len(), 1);
    Ok(())
}

#[test]
fn test_reset_all_restores_every_tracked_folder() -> Result<()> {
    let env = TestEnv::new()?;
    let a = env.folder("a")?;
    let b = env.folder("b")?;
    write_file(&a, "a.txt", "a")?;
    write_file(&b, "b.txt", "b")?;
    env.foam.track(&[&a, &b]);

    fs::remove_file(a.join("a.txt"))?;
    write_file(&b, "b.txt", "changed")?;

    let results = env.foam.reset_all()?;
    assert_eq!(results.len(), 2);
    assert!(results.values().all(Result::is_ok));
    assert_eq!(fs::read_to_string(a.join("a.txt"))?, "a");
    assert_eq!(fs::read_to_string(b.join("b.txt"))?, "b");
    Ok(())
}

#[test]
fn test_reset_of_missing_tracked_folder_is_not_found() -> Result<()> {
    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a", "a")?;
    env.foam.track(&[&f]).remove(&f).unwrap()?;

    fs::remove_dir_all(&f)?;
    let err = env.foam.reset(&[&f]).remove(&f).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!f.exists());
    Ok(())
}

#[test]
fn test_nested_tracked_folders_reset_independently() -> Result<()> {
    let env = TestEnv::new()?;
    let outer = env.folder("outer")?;
    let inner = env.folder("outer/inner")?;
    write_file(&inner, "x", "1")?;
    write_file(&outer, "y", "1")?;
    env.foam.track(&[&outer, &inner]);

    write_file(&inner, "x", "2")?;
    write_file(&outer, "y", "2")?;

    env.foam.reset(&[&inner]).remove(&inner).unwrap()?;
    assert_eq!(fs::read_to_string(inner.join("x"))?, "1");
    assert_eq!(fs::read_to_string(outer.join("y"))?, "2");
    Ok(())
}

#[test]
fn test_corrupted_blob_is_reported() -> Result<()> {
    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a.txt", "hello")?;
    env.foam.track(&[&f]).remove(&f).unwrap()?;

    let object = env.foam.content_store().object_path(&hash_bytes(b"hello"));
    fs::write(&object, b"not zstd at all")?;
    fs::remove_file(f.join("a.txt"))?;

    let err = env.foam.reset(&[&f]).remove(&f).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
    assert!(!f.join("a.txt").exists());
    Ok(())
}

#[test]
fn test_busy_folder_times_out_as_conflict() -> Result<()> {
    let mut config = Config::default();
    config.performance.parallel_threads = 1;
    config.performance.lock_timeout_secs = 0;
    let env = TestEnv::with_config(config)?;
    let f = env.folder("f")?;

    let _held = FolderLock::acquire(
        &env.foam.store_path().join(LOCKS_DIR),
        &f,
        Duration::from_secs(1),
    )?;
    let err = env.foam.track(&[&f]).remove(&f).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    Ok(())
}

#[test]
fn test_status_lists_pending_operations() -> Result<()> {
    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a", "a")?;
    env.foam.track(&[&f]).remove(&f).unwrap()?;

    write_file(&f, "a", "changed")?;
    write_file(&f, "b", "b")?;
    let script = env.foam.status(&f)?;
    let verbs: Vec<_> = script.iter().map(|op| op.verb()).collect();
    assert_eq!(verbs, vec!["remove-file", "remove-file", "write-file"]);
    assert_eq!(fs::read_to_string(f.join("a"))?, "changed");
    Ok(())
}

#[test]
fn test_gc_keeps_live_data() -> Result<()> {
    let env = TestEnv::new()?;
    let f = env.folder("f")?;
    write_file(&f, "a", "a")?;
    env.foam.track(&[&f]).remove(&f).unwrap()?;

    let report = env.foam.gc()?;
    assert_eq!(report.blobs_removed, 0);
    assert_eq!(report.manifests_removed, 0);
    assert_eq!(env.blob_count()?, 1);

    let walked = TreeWalker::new().walk(&f)?;
    assert_eq!(walked.len(), 1);
    Ok(())
}
