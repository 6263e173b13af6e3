//! The remote object namespace of a campaign run.
//!
//! The store is flat: "directories" exist only as shared name prefixes, so
//! everything here is pure string math over relative paths. All paths are
//! relative to the storage root prefix `WCM/<workflow>/`.

use crate::domain::VariantName;

/// Top-level prefix under which every workflow writes its output.
pub const WORKFLOW_ROOT: &str = "WCM";

/// Workflow metadata object, fetched and parsed before anything else.
pub const METADATA_FILE: &str = "metadata/metadata.json";

/// Filename whose presence in a generation's `simOut` directory proves the
/// generation finished successfully.
pub const COMPLETION_MARKER: &str = "Daughter1_inherited_state.cPickle";

/// Per-generation output files needed for analysis: selected table columns
/// and their attribute sidecars.
pub const SIM_FILES: [&str; 7] = [
    "Mass/attributes.json",
    "Mass/cellMass",
    "Mass/dryMass",
    "Main/attributes.json",
    "Main/time",
    "MonomerCounts/attributes.json",
    "MonomerCounts/monomerCounts",
];

/// Storage root prefix for one workflow, always ending in `/`.
pub fn root_prefix(workflow: &str) -> String {
    format!("{WORKFLOW_ROOT}/{workflow}/")
}

/// The per-variant serialized model parameters, fetched once per campaign.
pub fn sim_data_path(variant: &VariantName) -> String {
    format!("{}/kb/simData_Modified.cPickle", variant.as_str())
}

/// Zero-padded generation directory name, e.g. `generation_000031`.
pub fn generation_dir(generation: u32) -> String {
    format!("generation_{generation:06}")
}

/// Simulation output directory for one seed directory and generation.
pub fn sim_out_dir(seed_dir: &str, generation: u32) -> String {
    join(
        seed_dir,
        &format!("{}/000000/simOut", generation_dir(generation)),
    )
}

/// Marker path relative to a seed directory; its existence defines
/// "succeeded through `generation`".
pub fn completion_marker_path(generation: u32) -> String {
    format!(
        "{}/000000/simOut/{COMPLETION_MARKER}",
        generation_dir(generation)
    )
}

/// Join two relative path fragments without doubling the separator.
pub fn join(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        return rest.to_string();
    }
    if prefix.ends_with('/') {
        format!("{prefix}{rest}")
    } else {
        format!("{prefix}/{rest}")
    }
}

/// Strip the storage root prefix from a full object name, returning the
/// path relative to the workflow root. Names from foreign prefixes are
/// returned unchanged.
pub fn strip_root<'a>(name: &'a str, root: &str) -> &'a str {
    name.strip_prefix(root).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_dir_is_zero_padded() {
        assert_eq!(generation_dir(0), "generation_000000");
        assert_eq!(generation_dir(31), "generation_000031");
        assert_eq!(generation_dir(123_456), "generation_123456");
    }

    #[test]
    fn marker_path_targets_sim_out() {
        assert_eq!(
            completion_marker_path(31),
            "generation_000031/000000/simOut/Daughter1_inherited_state.cPickle"
        );
    }

    #[test]
    fn sim_out_dir_nests_under_seed() {
        assert_eq!(
            sim_out_dir("wildtype_000000/000001/", 2),
            "wildtype_000000/000001/generation_000002/000000/simOut"
        );
    }

    #[test]
    fn join_handles_trailing_separator() {
        assert_eq!(join("a/b", "c"), "a/b/c");
        assert_eq!(join("a/b/", "c"), "a/b/c");
        assert_eq!(join("", "c"), "c");
    }

    #[test]
    fn strip_root_removes_workflow_prefix() {
        let root = root_prefix("20210228.075124__run");
        assert_eq!(
            strip_root("WCM/20210228.075124__run/wildtype_000000/000001/", &root),
            "wildtype_000000/000001/"
        );
        assert_eq!(strip_root("other/prefix/file", &root), "other/prefix/file");
    }

    #[test]
    fn sim_data_path_lives_under_variant_kb() {
        let variant: VariantName = "wildtype_000000".parse().unwrap();
        assert_eq!(
            sim_data_path(&variant),
            "wildtype_000000/kb/simData_Modified.cPickle"
        );
    }
}
