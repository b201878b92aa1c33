use chrono::Utc;
use foam::diff::{EditOp, diff};
use foam::hash::hash_bytes;
use foam::manifest::{Entry, Manifest};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

mod common;

/// Path -> (private?, content). Paths that are also ancestors become directories.
type TreeSpec = BTreeMap<String, (bool, String)>;

fn tree_spec() -> impl Strategy<Value = TreeSpec> {
    prop::collection::btree_map("[ab](/[abc]){0,2}", (any::<bool>(), "[xyz]{0,3}"), 0..10)
}

fn directories(spec: &TreeSpec) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for path in spec.keys() {
        let mut current = path.as_str();
        while let Some((parent, _)) = current.rsplit_once('/') {
            dirs.insert(parent.to_string());
            current = parent;
        }
    }
    dirs
}

fn dir_mode(private: bool) -> u32 {
    if private { 0o700 } else { 0o755 }
}

fn file_mode(private: bool) -> u32 {
    if private { 0o600 } else { 0o644 }
}

fn manifest_of(spec: &TreeSpec) -> Manifest {
    let dirs = directories(spec);
    let mut entries: Vec<Entry> = dirs
        .iter()
        .map(|dir| {
            let private = spec.get(dir).is_some_and(|(private, _)| *private);
            Entry::directory(dir.clone(), dir_mode(private))
        })
        .collect();
    for (path, (private, content)) in spec {
        if !dirs.contains(path) {
            entries.push(Entry::file(
                path.clone(),
                file_mode(*private),
                content.len() as u64,
                hash_bytes(content.as_bytes()),
            ));
        }
    }
    Manifest::new(PathBuf::from("/tree"), Utc::now(), entries).unwrap()
}

fn under(path: &str, ancestor: &str) -> bool {
    path.starts_with(ancestor) && path[ancestor.len()..].starts_with('/')
}

proptest! {
    #[test]
    fn test_self_diff_is_empty(spec in tree_spec()) {
        let manifest = manifest_of(&spec);
        prop_assert!(diff(&manifest, &manifest).is_empty());
    }

    #[test]
    fn test_removals_and_creations_respect_nesting(from in tree_spec(), to in tree_spec()) {
        let script = diff(&manifest_of(&from), &manifest_of(&to));
        let ops = script.ops();

        for (i, op) in ops.iter().enumerate() {
            match op {
                EditOp::RemoveDir { path } => {
                    for later in &ops[i + 1..] {
                        prop_assert!(
                            !(later.is_removal() && under(later.path(), path)),
                            "{later} after {op}"
                        );
                    }
                }
                EditOp::CreateDir { path } => {
                    for earlier in &ops[..i] {
                        prop_assert!(
                            !(earlier.is_creation() && under(earlier.path(), path)),
                            "{earlier} before {op}"
                        );
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(unix)]
mod filesystem {
    use super::*;
    use crate::common::{TestEnv, mode_of, set_mode, tree_listing, write_file};
    use std::fs;
    use std::path::Path;

    fn materialize(root: &Path, spec: &TreeSpec) {
        for entry in fs::read_dir(root).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                fs::remove_dir_all(&path).unwrap();
            } else {
                fs::remove_file(&path).unwrap();
            }
        }

        let dirs = directories(spec);
        for dir in &dirs {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        for (path, (private, content)) in spec {
            if dirs.contains(path) {
                set_mode(&root.join(path), dir_mode(*private)).unwrap();
            } else {
                write_file(root, path, content).unwrap();
                set_mode(&root.join(path), file_mode(*private)).unwrap();
            }
        }
    }

    fn modes(root: &Path) -> Vec<(String, u32)> {
        tree_listing(root)
            .unwrap()
            .into_iter()
            .map(|(rel, _)| {
                let mode = mode_of(&root.join(&rel)).unwrap();
                (rel, mode)
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn test_reset_round_trips_any_mutation(original in tree_spec(), mutated in tree_spec()) {
            let env = TestEnv::new().unwrap();
            let f = env.folder("f").unwrap();

            materialize(&f, &original);
            let expected_listing = tree_listing(&f).unwrap();
            let expected_modes = modes(&f);
            env.foam.track(&[&f]).remove(&f).unwrap().unwrap();

            materialize(&f, &mutated);
            env.foam.reset(&[&f]).remove(&f).unwrap().unwrap();

            prop_assert_eq!(tree_listing(&f).unwrap(), expected_listing);
            prop_assert_eq!(modes(&f), expected_modes);
            prop_assert!(env.foam.status(&f).unwrap().is_empty());
        }
    }
}
