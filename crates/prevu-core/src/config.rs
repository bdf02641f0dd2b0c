//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Options governing one preview session.
///
/// All fields have serde defaults so a host can deserialize a partial
/// config (`{ "entry_point": "src/Main.tsx" }`) from project settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Debounce window between the last edit and recompilation, in
    /// milliseconds. Bursts of edits inside the window collapse into a
    /// single compile pass and a single remount.
    pub debounce_ms: u64,

    /// Module whose default export is mounted as the application root.
    pub entry_point: String,

    /// Overall deadline for one bundle execution, in milliseconds: render
    /// plus whatever async handler work the bundle schedules. On expiry the
    /// run is abandoned and reported as a preview error.
    pub script_timeout_ms: u64,

    /// Project identity; keys durable store snapshots.
    pub project_id: String,

    /// Persist store mutations to disk so data survives a full host
    /// restart, not just a sandbox remount.
    pub durable_store: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            entry_point: "src/App.tsx".to_string(),
            script_timeout_ms: 5000,
            project_id: "default".to_string(),
            durable_store: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PreviewConfig::default();
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.entry_point, "src/App.tsx");
        assert_eq!(config.script_timeout_ms, 5000);
        assert!(!config.durable_store);
    }

    #[test]
    fn test_partial_deserialization() {
        let config: PreviewConfig =
            serde_json::from_str(r#"{"entry_point":"src/Main.tsx","debounce_ms":200}"#).unwrap();
        assert_eq!(config.entry_point, "src/Main.tsx");
        assert_eq!(config.debounce_ms, 200);
        assert_eq!(config.script_timeout_ms, 5000);
    }
}
