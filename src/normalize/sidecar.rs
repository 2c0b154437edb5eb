//! Directory-anchored sidecar files supplying annotation values.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::record::{scalar_map, RawValues};

/// One sidecar document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Sidecar {
    /// Directory the sidecar applies to, relative to the project root.
    #[serde(default)]
    pub dir: String,
    /// Values applied to every field under `dir`.
    #[serde(default, deserialize_with = "scalar_map")]
    pub defaults: RawValues,
    /// Per-field values keyed by `field_id`.
    #[serde(default, deserialize_with = "field_maps")]
    pub fields: BTreeMap<String, RawValues>,
}

fn field_maps<'de, D>(deserializer: D) -> Result<BTreeMap<String, RawValues>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Entry(#[serde(deserialize_with = "scalar_map")] RawValues);

    let raw: BTreeMap<String, Entry> = BTreeMap::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, Entry(v))| (k, v)).collect())
}

/// All sidecars of a run, indexed by normalized directory.
#[derive(Debug, Clone, Default)]
pub struct SidecarSet {
    by_dir: BTreeMap<String, Sidecar>,
}

impl SidecarSet {
    /// Indexes sidecars; later documents for the same directory win per key.
    #[must_use]
    pub fn new(sidecars: impl IntoIterator<Item = Sidecar>) -> Self {
        let mut by_dir: BTreeMap<String, Sidecar> = BTreeMap::new();
        for sidecar in sidecars {
            let dir = normalize_dir(&sidecar.dir);
            let slot = by_dir
                .entry(dir.clone())
                .or_insert_with(|| Sidecar { dir, ..Sidecar::default() });
            slot.defaults.extend(sidecar.defaults);
            for (field_id, values) in sidecar.fields {
                slot.fields.entry(field_id).or_default().extend(values);
            }
        }
        Self { by_dir }
    }

    /// Returns `true` when no sidecar was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_dir.is_empty()
    }

    /// Merged sidecar values for a field declared in `file`.
    ///
    /// Applies the root first and the closest directory last, so closer
    /// sidecars win. Within one directory the field entry beats its
    /// directory defaults.
    #[must_use]
    pub fn resolve(&self, file: Option<&str>, field_id: Option<&str>) -> RawValues {
        let mut merged = RawValues::new();
        for dir in ancestor_dirs(file) {
            let Some(sidecar) = self.by_dir.get(&dir) else {
                continue;
            };
            merged.extend(sidecar.defaults.clone());
            if let Some(values) = field_id.and_then(|id| sidecar.fields.get(id)) {
                merged.extend(values.clone());
            }
        }
        merged.retain(|_, v| !v.trim().is_empty());
        merged
    }
}

fn normalize_dir(dir: &str) -> String {
    let dir = dir.replace('\\', "/");
    dir.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Root first, then each deeper directory containing `file`.
fn ancestor_dirs(file: Option<&str>) -> Vec<String> {
    let mut dirs = vec![String::new()];
    let Some(file) = file else {
        return dirs;
    };
    let normalized = normalize_dir(file);
    let parts: Vec<&str> = normalized.split('/').collect();
    let dir_parts = &parts[..parts.len().saturating_sub(1)];
    for depth in 1..=dir_parts.len() {
        dirs.push(dir_parts[..depth].join("/"));
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_map(pairs: &[(&str, &str)]) -> RawValues {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn make_sidecar(
        dir: &str,
        defaults: &[(&str, &str)],
        field: Option<(&str, &[(&str, &str)])>,
    ) -> Sidecar {
        Sidecar {
            dir: dir.to_string(),
            defaults: to_map(defaults),
            fields: field.map(|(id, values)| (id.to_string(), to_map(values))).into_iter().collect(),
        }
    }

    #[test]
    fn ancestor_dirs_run_root_to_leaf() {
        assert_eq!(ancestor_dirs(Some("./a/b/file.rs")), vec!["", "a", "a/b"]);
        assert_eq!(ancestor_dirs(Some("main.rs")), vec![""]);
        assert_eq!(ancestor_dirs(None), vec![""]);
    }

    #[test]
    fn closest_directory_wins() {
        let set = SidecarSet::new([
            make_sidecar("", &[("owner", "team.root"), ("note", "root note")], None),
            make_sidecar("a", &[("owner", "team.a")], None),
            make_sidecar("a/b", &[("owner", "team.ab")], None),
        ]);
        let values = set.resolve(Some("a/b/file.rs"), Some("user_id"));
        assert_eq!(values["owner"], "team.ab");
        assert_eq!(values["note"], "root note");
    }

    #[test]
    fn field_entry_beats_directory_defaults_in_same_sidecar() {
        let field_values: &[(&str, &str)] = &[("break_policy", "additive_only")];
        let set = SidecarSet::new([make_sidecar(
            "svc",
            &[("break_policy", "strict")],
            Some(("user_id", field_values)),
        )]);
        assert_eq!(set.resolve(Some("svc/x.rs"), Some("user_id"))["break_policy"], "additive_only");
        assert_eq!(set.resolve(Some("svc/x.rs"), Some("other_id"))["break_policy"], "strict");
    }

    #[test]
    fn deserializes_yaml_sidecar() {
        let yaml = "dir: src/api\ndefaults:\n  owner: team.api\nfields:\n  user_id:\n    source_version: 3\n";
        let sidecar: Sidecar = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(sidecar.fields["user_id"]["source_version"], "3");
    }
}
