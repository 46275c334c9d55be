//! Built-in presets and preset resolution.

use std::path::Path;

use docmigrate_core::{Error, Result};
use tracing::debug;

use crate::preset::*;

const BUILTIN_NAMES: &[&str] = &["owner-ids", "subject-ids", "owner-emails", "owners-from-email", "strip-legacy"];

/// Names of all built-in presets.
pub fn builtin_names() -> &'static [&'static str] {
    BUILTIN_NAMES
}

/// Look up a built-in preset by name.
pub fn builtin(name: &str) -> Option<Preset> {
    let preset = match name {
        // ownerId from whichever legacy owner field is set
        "owner-ids" => Preset::new(
            name,
            DEFAULT_BATCH_LIMIT,
            ["quizzes", "topics", "subjects"]
                .into_iter()
                .map(|c| {
                    CollectionSpec::new(
                        c,
                        vec![Operation::coalesce(&["ownerId", "uid", "userId"], "ownerId", false)],
                    )
                })
                .collect(),
        ),
        "subject-ids" => Preset::new(
            name,
            DEFAULT_BATCH_LIMIT,
            vec![
                CollectionSpec::new(
                    "topics",
                    vec![Operation::rename("subject_id", "subjectId", false, true)],
                ),
                CollectionSpec::new(
                    "quizzes",
                    vec![
                        Operation::rename("subject_id", "subjectId", false, true),
                        Operation::rename("topic_id", "topicId", false, true),
                    ],
                ),
            ],
        ),
        "owner-emails" => Preset::new(
            name,
            DEFAULT_BATCH_LIMIT,
            vec![CollectionSpec::new(
                "quizzes",
                vec![Operation::LookupField {
                    key: "ownerId".into(),
                    collection: "users".into(),
                    by: LookupBy::DocumentId,
                    select: Selector::Field("email".into()),
                    to: "ownerEmail".into(),
                    overwrite: false,
                }],
            )],
        ),
        "owners-from-email" => Preset::new(
            name,
            DEFAULT_BATCH_LIMIT,
            vec![CollectionSpec::new(
                "quizzes",
                vec![Operation::LookupField {
                    key: "ownerEmail".into(),
                    collection: "users".into(),
                    by: LookupBy::Field("email".into()),
                    select: Selector::DocumentId,
                    to: "ownerId".into(),
                    overwrite: false,
                }],
            )],
        ),
        "strip-legacy" => Preset::new(
            name,
            DEFAULT_BATCH_LIMIT,
            ["quizzes", "topics", "subjects"]
                .into_iter()
                .map(|c| {
                    CollectionSpec::new(
                        c,
                        vec![Operation::remove(&["uid", "userId", "subject_id", "topic_id"])],
                    )
                })
                .collect(),
        ),
        _ => return None,
    };
    Some(preset)
}

/// Resolve a preset argument: a built-in name, an inline JSON literal, or a
/// path to a JSON file.
pub fn resolve_preset(arg: &str) -> Result<Preset> {
    let trimmed = arg.trim();
    if let Some(preset) = builtin(trimmed) {
        debug!("Using built-in preset '{}'", trimmed);
        return Ok(preset);
    }
    if trimmed.starts_with('{') {
        return Preset::from_json(trimmed);
    }

    let path = Path::new(trimmed);
    if path.is_file() {
        debug!("Loading preset from {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read preset {}: {}", path.display(), e)))?;
        return Preset::from_json(&content);
    }

    Err(Error::Config(format!(
        "unknown preset '{}' (built-in presets: {})",
        trimmed,
        BUILTIN_NAMES.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtins_resolve_and_validate() {
        for name in builtin_names() {
            let preset = builtin(name).unwrap_or_else(|| panic!("missing builtin {}", name));
            assert_eq!(preset.name, *name);
            preset.validate().unwrap();
        }
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn test_resolve_inline_json() {
        let preset = resolve_preset(
            r#"{"name": "inline", "batchLimit": 10,
                "collections": [{"name": "q", "operations": [{"op": "removeFields", "fields": ["a"]}]}]}"#,
        )
        .unwrap();
        assert_eq!(preset.name, "inline");
        assert_eq!(preset.batch_limit, 10);
    }

    #[test]
    fn test_resolve_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preset.json");
        let preset = builtin("subject-ids").unwrap();
        std::fs::write(&path, serde_json::to_string_pretty(&preset).unwrap()).unwrap();

        let loaded = resolve_preset(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded, preset);
    }

    #[test]
    fn test_unreadable_preset_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preset.json");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let err = resolve_preset(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("cannot read preset"));
    }

    #[test]
    fn test_resolve_unknown() {
        let err = resolve_preset("does-not-exist").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("owner-ids"));
    }
}
