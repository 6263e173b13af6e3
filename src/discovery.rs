use regex::Regex;
use tracing::debug;

use crate::domain::VariantName;
use crate::error::FetchError;
use crate::layout;
use crate::storage::ObjectStore;

/// Find all `variant/seed/` subpaths (e.g. `wildtype_000000/000001/`) whose
/// simulation ran to completion through generation `max_gen`.
///
/// Completion is defined by presence alone: a seed line that reached the
/// target generation wrote the marker object under that generation's
/// `simOut` directory, one that stalled earlier never did. Nothing is
/// asserted about intermediate generations, and a marker left behind at a
/// later stray generation by a partially rerun workflow still counts.
pub fn find_completed_seed_dirs<S: ObjectStore + ?Sized>(
    store: &S,
    variant: &VariantName,
    max_gen: u32,
) -> Result<Vec<String>, FetchError> {
    // Listing `variant/0` matches the six-digit zero-padded seed
    // directories up to 099999 while skipping the variant's non-seed
    // children such as `kb/`.
    let seed_glob = format!("{}/0", variant.as_str());
    let root = store.root_prefix().to_string();
    let seed_dirs: Vec<String> = store
        .list_children(&seed_glob)?
        .into_iter()
        .map(|object| layout::strip_root(&object.name, &root).to_string())
        .collect();
    debug!("{} candidate seed dirs under {}", seed_dirs.len(), variant);

    // Probe with a prefix listing rather than a point lookup; any non-empty
    // result for the exact marker path counts as success.
    let marker = layout::completion_marker_path(max_gen);
    let pattern = seed_dir_pattern(&root);

    let mut completed = Vec::new();
    for seed_dir in &seed_dirs {
        let probe = layout::join(seed_dir, &marker);
        for object in store.list_by_prefix(&probe)? {
            if let Some(captures) = pattern.captures(&object.name) {
                completed.push(captures[1].to_string());
            }
        }
    }
    Ok(completed)
}

/// Matches everything between the storage root prefix and the literal
/// `generation_` directory, recovering the `variant/seed/` subpath from an
/// object name regardless of how deep the matched object sits.
fn seed_dir_pattern(root: &str) -> Regex {
    Regex::new(&format!("^{}(.*)generation_\\d{{6}}", regex::escape(root))).unwrap()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::storage::RemoteObject;

    use super::*;

    struct StaticStore {
        root: String,
        objects: Vec<String>,
    }

    impl StaticStore {
        fn new(objects: &[&str]) -> Self {
            Self {
                root: "WCM/20210228.075124__run/".to_string(),
                objects: objects.iter().map(|name| name.to_string()).collect(),
            }
        }
    }

    impl ObjectStore for StaticStore {
        fn root_prefix(&self) -> &str {
            &self.root
        }

        fn list_by_prefix(&self, prefix: &str) -> Result<Vec<RemoteObject>, FetchError> {
            let full = format!("{}{}", self.root, prefix);
            Ok(self
                .objects
                .iter()
                .filter(|name| name.starts_with(&full))
                .map(|name| RemoteObject { name: name.clone() })
                .collect())
        }

        fn list_children(&self, prefix: &str) -> Result<Vec<RemoteObject>, FetchError> {
            let full = format!("{}{}", self.root, prefix);
            let mut children: Vec<RemoteObject> = Vec::new();
            for name in &self.objects {
                if !name.starts_with(&full) {
                    continue;
                }
                let tail = &name[self.root.len()..];
                let segments: Vec<&str> = tail.splitn(3, '/').collect();
                if segments.len() >= 2 {
                    let child = format!("{}{}/{}/", self.root, segments[0], segments[1]);
                    if !children.iter().any(|existing| existing.name == child) {
                        children.push(RemoteObject { name: child });
                    }
                }
            }
            Ok(children)
        }

        fn transfer(&self, relative_path: &str, _local_path: &Path) -> Result<(), FetchError> {
            Err(FetchError::Transfer {
                path: relative_path.to_string(),
                message: "not supported".to_string(),
            })
        }
    }

    fn variant() -> VariantName {
        "wildtype_000000".parse().unwrap()
    }

    #[test]
    fn finds_seeds_with_the_target_marker() {
        let store = StaticStore::new(&[
            "WCM/20210228.075124__run/wildtype_000000/000000/generation_000031/000000/simOut/Daughter1_inherited_state.cPickle",
            "WCM/20210228.075124__run/wildtype_000000/000002/generation_000031/000000/simOut/Daughter1_inherited_state.cPickle",
        ]);
        let dirs = find_completed_seed_dirs(&store, &variant(), 31).unwrap();
        assert_eq!(
            dirs,
            vec![
                "wildtype_000000/000000/".to_string(),
                "wildtype_000000/000002/".to_string(),
            ]
        );
    }

    #[test]
    fn excludes_seeds_that_stalled_earlier() {
        let store = StaticStore::new(&[
            // Completed through generation 31.
            "WCM/20210228.075124__run/wildtype_000000/000000/generation_000031/000000/simOut/Daughter1_inherited_state.cPickle",
            // Stalled: wrote output at generation 17 but no later marker.
            "WCM/20210228.075124__run/wildtype_000000/000001/generation_000017/000000/simOut/Daughter1_inherited_state.cPickle",
        ]);
        let dirs = find_completed_seed_dirs(&store, &variant(), 31).unwrap();
        assert_eq!(dirs, vec!["wildtype_000000/000000/".to_string()]);
    }

    #[test]
    fn non_seed_children_are_skipped() {
        let store = StaticStore::new(&[
            "WCM/20210228.075124__run/wildtype_000000/kb/simData_Modified.cPickle",
            "WCM/20210228.075124__run/wildtype_000000/000003/generation_000007/000000/simOut/Daughter1_inherited_state.cPickle",
        ]);
        let dirs = find_completed_seed_dirs(&store, &variant(), 7).unwrap();
        assert_eq!(dirs, vec!["wildtype_000000/000003/".to_string()]);
    }

    #[test]
    fn zero_qualifying_seeds_is_empty_not_an_error() {
        let store = StaticStore::new(&[]);
        let dirs = find_completed_seed_dirs(&store, &variant(), 31).unwrap();
        assert!(dirs.is_empty());
    }

    #[test]
    fn pattern_recovers_prefix_from_deep_names() {
        let pattern = seed_dir_pattern("WCM/run/");
        let captures = pattern
            .captures("WCM/run/wildtype_000000/000042/generation_000031/000000/simOut/Daughter1_inherited_state.cPickle")
            .unwrap();
        assert_eq!(&captures[1], "wildtype_000000/000042/");
    }

    #[test]
    fn pattern_rejects_foreign_roots() {
        let pattern = seed_dir_pattern("WCM/run/");
        assert!(
            pattern
                .captures("WCM/other/wildtype_000000/000042/generation_000031/x")
                .is_none()
        );
    }
}
