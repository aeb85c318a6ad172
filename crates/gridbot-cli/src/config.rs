//! Configuration – reads/writes `~/.gridbot/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use gridbot_kernel::RepairPolicy;
use gridbot_mapping::CompletenessPolicy;
use gridbot_runtime::NavigatorConfig;
use gridbot_types::Heading;

/// Size of the simulated road grid the robot is dropped into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: i32,
    pub height: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 3,
            height: 3,
        }
    }
}

/// Where saved maps live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path. A leading `~/` is expanded.
    pub database: String,
    /// Saved map to start from instead of an empty one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: "~/.gridbot/maps.db".to_string(),
            restore: None,
        }
    }
}

/// Persisted user configuration stored in `~/.gridbot/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub world: WorldConfig,
    pub storage: StorageConfig,
    pub navigator: NavigatorConfig,
}

impl Config {
    /// The database path with `~/` expanded against `home`.
    pub fn database_path(&self, home: &str) -> PathBuf {
        match self.storage.database.strip_prefix("~/") {
            Some(rest) => PathBuf::from(home).join(rest),
            None => PathBuf::from(&self.storage.database),
        }
    }
}

/// The user's home directory, or `.` when it cannot be determined.
pub fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Return the path to `~/.gridbot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".gridbot").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let Some(mut cfg) = load_from(&config_path())? else {
        return Ok(None);
    };
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(Some(cfg))
}

/// Load the config from a specific path, without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    validate(&cfg)?;
    Ok(Some(cfg))
}

/// Reject settings the simulator or navigator cannot work with.
pub fn validate(cfg: &Config) -> Result<(), String> {
    if cfg.world.width < 1 || cfg.world.height < 1 {
        return Err(format!(
            "world must be at least 1x1, got {}x{}",
            cfg.world.width, cfg.world.height
        ));
    }
    if cfg.storage.database.trim().is_empty() {
        return Err("storage.database must not be empty".to_string());
    }
    let blockage = &cfg.navigator.blockage;
    if blockage.samples == 0 {
        return Err("navigator.blockage.samples must be at least 1".to_string());
    }
    if blockage.axis_threshold_m <= 0.0 || blockage.diagonal_threshold_m <= 0.0 {
        return Err("blockage thresholds must be positive".to_string());
    }
    Ok(())
}

/// Apply `GRIDBOT_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `GRIDBOT_WORLD_WIDTH` | `world.width` |
/// | `GRIDBOT_WORLD_HEIGHT` | `world.height` |
/// | `GRIDBOT_MAP_DB` | `storage.database` |
/// | `GRIDBOT_RESTORE` | `storage.restore` |
/// | `GRIDBOT_REPAIR_POLICY` | `navigator.repair_policy` (`fatal` / `operator`) |
/// | `GRIDBOT_CONFIRM_TURNS` | `navigator.confirm_uncertain_turns` |
/// | `GRIDBOT_EXEMPT_HEADING` | `navigator.completeness` (heading, or `none` for strict) |
/// | `GRIDBOT_BLOCKAGE_SAMPLES` | `navigator.blockage.samples` |
/// | `GRIDBOT_FALLBACK_LOOPS` | `navigator.fallback_loop_threshold` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(width) = env_parsed("GRIDBOT_WORLD_WIDTH") {
        cfg.world.width = width;
    }
    if let Some(height) = env_parsed("GRIDBOT_WORLD_HEIGHT") {
        cfg.world.height = height;
    }
    if let Ok(v) = std::env::var("GRIDBOT_MAP_DB") {
        cfg.storage.database = v;
    }
    if let Ok(v) = std::env::var("GRIDBOT_RESTORE") {
        cfg.storage.restore = Some(v).filter(|name| !name.trim().is_empty());
    }
    if let Some(policy) = env_parsed::<RepairPolicy>("GRIDBOT_REPAIR_POLICY") {
        cfg.navigator.repair_policy = policy;
    }
    if let Some(confirm) = env_parsed("GRIDBOT_CONFIRM_TURNS") {
        cfg.navigator.confirm_uncertain_turns = confirm;
    }
    if let Ok(v) = std::env::var("GRIDBOT_EXEMPT_HEADING") {
        if v.trim().eq_ignore_ascii_case("none") {
            cfg.navigator.completeness = CompletenessPolicy::Strict;
        } else if let Ok(heading) = v.parse::<Heading>() {
            cfg.navigator.completeness = CompletenessPolicy::ExemptOriginHeading(heading);
        }
    }
    if let Some(samples) = env_parsed("GRIDBOT_BLOCKAGE_SAMPLES") {
        cfg.navigator.blockage.samples = samples;
    }
    if let Some(threshold) = env_parsed("GRIDBOT_FALLBACK_LOOPS") {
        cfg.navigator.fallback_loop_threshold = threshold;
    }
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.gridbot/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.world, WorldConfig::default());
        assert_eq!(loaded.storage.database, "~/.gridbot/maps.db");
        assert_eq!(loaded.navigator.repair_policy, RepairPolicy::Fatal);
        assert_eq!(loaded.navigator.completeness, CompletenessPolicy::Strict);
    }

    #[test]
    fn non_default_policies_survive_a_roundtrip() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.navigator.repair_policy = RepairPolicy::AskOperator;
        cfg.navigator.completeness = CompletenessPolicy::ExemptOriginHeading(Heading::SOUTH);
        cfg.storage.restore = Some("lab".to_string());
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[world]\nwidth = 5\n\n[navigator]\nrepair_policy = \"operator\"\n",
        )
        .expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.world.width, 5);
        assert_eq!(loaded.world.height, 3);
        assert_eq!(loaded.navigator.repair_policy, RepairPolicy::AskOperator);
        assert_eq!(loaded.navigator.blockage.samples, 5);
    }

    #[test]
    fn invalid_world_is_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[world]\nwidth = 0\n").expect("write");
        let err = load_from(&path).expect_err("must fail");
        assert!(err.contains("at least 1x1"));
    }

    #[test]
    fn config_path_points_to_gridbot_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".gridbot"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn database_path_expands_home() {
        let mut cfg = Config::default();
        assert_eq!(
            cfg.database_path("/home/op"),
            PathBuf::from("/home/op/.gridbot/maps.db")
        );
        cfg.storage.database = "/var/lib/gridbot.db".to_string();
        assert_eq!(
            cfg.database_path("/home/op"),
            PathBuf::from("/var/lib/gridbot.db")
        );
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn apply_env_overrides_changes_world_size() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("GRIDBOT_WORLD_WIDTH", "6") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.world.width, 6);
        unsafe { std::env::remove_var("GRIDBOT_WORLD_WIDTH") };
    }

    #[test]
    fn apply_env_overrides_changes_repair_policy() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("GRIDBOT_REPAIR_POLICY", "operator") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.navigator.repair_policy, RepairPolicy::AskOperator);
        unsafe { std::env::remove_var("GRIDBOT_REPAIR_POLICY") };
    }

    #[test]
    fn apply_env_overrides_sets_and_clears_exemption() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("GRIDBOT_EXEMPT_HEADING", "S") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(
            cfg.navigator.completeness,
            CompletenessPolicy::ExemptOriginHeading(Heading::SOUTH)
        );

        unsafe { std::env::set_var("GRIDBOT_EXEMPT_HEADING", "none") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.navigator.completeness, CompletenessPolicy::Strict);
        unsafe { std::env::remove_var("GRIDBOT_EXEMPT_HEADING") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_samples() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("GRIDBOT_BLOCKAGE_SAMPLES", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.navigator.blockage.samples, 5);
        unsafe { std::env::remove_var("GRIDBOT_BLOCKAGE_SAMPLES") };
    }
}
