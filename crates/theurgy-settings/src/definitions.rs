//! Persona definition loading.
//!
//! The definitions file is a JSON array of
//! [`PersonaDefinition`](theurgy_core::persona::PersonaDefinition) objects.
//! Loading builds the complete map before returning so a reload can swap it
//! in one step. Allow-listed command names are normalized to their bare
//! leading token (no `/`, no arguments).

use std::collections::HashMap;
use std::path::Path;

use theurgy_core::ids::PersonaId;
use theurgy_core::persona::PersonaDefinition;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};

/// Read and validate a definitions file.
pub fn load_definitions(path: &Path) -> Result<HashMap<PersonaId, PersonaDefinition>> {
    debug!(?path, "loading persona definitions");
    let content = std::fs::read_to_string(path)?;
    parse_definitions(&content)
}

/// Parse and validate a definitions document.
pub fn parse_definitions(content: &str) -> Result<HashMap<PersonaId, PersonaDefinition>> {
    let list: Vec<PersonaDefinition> = serde_json::from_str(content)?;
    let mut map = HashMap::with_capacity(list.len());
    for mut def in list {
        if def.id.as_str().trim().is_empty() {
            return Err(SettingsError::InvalidValue("persona id is empty".into()));
        }
        normalize_allow_list(&mut def);
        if map.contains_key(&def.id) {
            return Err(SettingsError::InvalidValue(format!(
                "duplicate persona id: {}",
                def.id
            )));
        }
        let _ = map.insert(def.id.clone(), def);
    }
    Ok(map)
}

fn normalize_allow_list(def: &mut PersonaDefinition) {
    let raw = std::mem::take(&mut def.policy.allowed_commands);
    for entry in raw {
        let name = entry
            .trim()
            .trim_start_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        if name.is_empty() {
            warn!(persona = %def.id, "ignoring empty allow-list entry");
            continue;
        }
        let _ = def.policy.allowed_commands.insert(name);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_array_of_definitions() {
        let map = parse_definitions(
            r#"[
                {"id": "sun", "description": "Radiant."},
                {"id": "moon", "description": "Pale.", "policy": {"reputationRequired": 10}}
            ]"#,
        )
        .unwrap();
        assert_eq!(map.len(), 2);
        let moon = &map[&PersonaId::from("moon")];
        assert_eq!(moon.policy.reputation_required, Some(10));
    }

    #[test]
    fn allow_list_is_normalized_to_leading_token() {
        let map = parse_definitions(
            r#"[{"id": "sun", "policy": {"allowedCommands": ["/give", "effect give", "  ", "xp"]}}]"#,
        )
        .unwrap();
        let sun = &map[&PersonaId::from("sun")];
        let names: Vec<&str> = sun.policy.allowed_commands.iter().map(String::as_str).collect();
        assert_eq!(names, ["effect", "give", "xp"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = parse_definitions(r#"[{"id": "sun"}, {"id": "sun"}]"#).unwrap_err();
        assert_matches!(err, SettingsError::InvalidValue(msg) if msg.contains("sun"));
    }

    #[test]
    fn empty_id_is_rejected() {
        assert_matches!(
            parse_definitions(r#"[{"id": " "}]"#),
            Err(SettingsError::InvalidValue(_))
        );
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("personas.json");
        std::fs::write(&path, r#"[{"id": "storm", "description": "Loud."}]"#).unwrap();
        let map = load_definitions(&path).unwrap();
        assert!(map.contains_key(&PersonaId::from("storm")));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            load_definitions(&dir.path().join("absent.json")),
            Err(SettingsError::Io(_))
        );
    }
}
