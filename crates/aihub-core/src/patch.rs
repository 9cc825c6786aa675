//! RBAC cluster-role patching.
//!
//! Cluster roles generated by the operators lack a few permissions on
//! OpenShift. Each patch loads the fetched document, resets its metadata to a
//! fixed literal (dropping resourceVersion, uid, and the rest of the
//! cluster-assigned fields), appends verbs/resources to the matching rule
//! entries, and writes the document back in block style.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::{AihubError, Result};
use crate::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Append {
    /// Append a verb to the entry's `verbs` list.
    Verb(&'static str),
    /// Append one or more entries to the entry's `resources` list.
    Resources(&'static [&'static str]),
}

/// Applied to every rule entry whose `resources` list contains `marker`.
/// Entries are matched against rules in order; only the first match applies.
#[derive(Debug, Clone)]
pub struct PatchRule {
    pub marker: &'static str,
    pub append: Append,
}

/// Fixed metadata for the patched argo cluster role.
pub fn argo_metadata() -> Value {
    let mut labels = Mapping::new();
    labels.insert("app".into(), "argo".into());
    let mut meta = Mapping::new();
    meta.insert("labels".into(), Value::Mapping(labels));
    meta.insert("name".into(), "argo".into());
    Value::Mapping(meta)
}

/// Argo needs to delete pods and finalize workflows.
pub fn argo_rules() -> Vec<PatchRule> {
    vec![
        PatchRule {
            marker: "pods",
            append: Append::Verb("delete"),
        },
        PatchRule {
            marker: "workflows",
            append: Append::Resources(&["workflows/finalizers"]),
        },
    ]
}

/// Fixed metadata for the patched study-job controller cluster role.
pub fn studyjob_metadata() -> Value {
    let mut meta = Mapping::new();
    meta.insert("name".into(), "studyjob-controller".into());
    Value::Mapping(meta)
}

/// The study-job controller finalizes jobs, tfjobs, and pytorchjobs.
pub fn studyjob_rules() -> Vec<PatchRule> {
    vec![
        PatchRule {
            marker: "jobs",
            append: Append::Resources(&["jobs/finalizers"]),
        },
        PatchRule {
            marker: "tfjobs",
            append: Append::Resources(&["tfjobs/finalizers", "pytorchjobs/finalizers"]),
        },
    ]
}

/// Patch the cluster role at `path` in place: replace `metadata` with the
/// supplied literal and apply the first matching rule to each entry of the
/// top-level `rules` sequence.
pub fn patch_cluster_role(path: &Path, metadata: Value, rules: &[PatchRule]) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let mut doc: Value = serde_yaml::from_str(&text)?;

    let map = doc
        .as_mapping_mut()
        .ok_or_else(|| malformed(path, "document is not a mapping"))?;
    if !map.contains_key(&Value::from("metadata")) {
        return Err(malformed(path, "missing `metadata`"));
    }
    map.insert("metadata".into(), metadata);

    let entries = map
        .get_mut(&Value::from("rules"))
        .ok_or_else(|| malformed(path, "missing `rules`"))?
        .as_sequence_mut()
        .ok_or_else(|| malformed(path, "`rules` is not a sequence"))?;
    for entry in entries {
        apply_first_matching(entry, rules, path)?;
    }

    io::atomic_write(path, serde_yaml::to_string(&doc)?.as_bytes())
}

fn apply_first_matching(entry: &mut Value, rules: &[PatchRule], path: &Path) -> Result<()> {
    let Some(rule) = rules.iter().find(|r| resources_contain(entry, r.marker)) else {
        return Ok(());
    };
    match &rule.append {
        Append::Verb(verb) => push_onto(entry, "verbs", verb, path)?,
        Append::Resources(values) => {
            for value in *values {
                push_onto(entry, "resources", value, path)?;
            }
        }
    }
    Ok(())
}

fn resources_contain(entry: &Value, marker: &str) -> bool {
    entry
        .get("resources")
        .and_then(Value::as_sequence)
        .map(|seq| seq.iter().any(|v| v.as_str() == Some(marker)))
        .unwrap_or(false)
}

fn push_onto(entry: &mut Value, key: &str, value: &str, path: &Path) -> Result<()> {
    let list = entry
        .get_mut(key)
        .and_then(Value::as_sequence_mut)
        .ok_or_else(|| malformed(path, &format!("rule entry has no `{key}` list")))?;
    list.push(Value::from(value));
    Ok(())
}

fn malformed(path: &Path, detail: &str) -> AihubError {
    AihubError::MalformedManifest {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}
