//! Project profiles: detection rules plus quality-gate configuration.
//!
//! Profiles are compiled in. An optional `.pawl/profiles.toml` at the
//! project root is validated and merged over the built-ins; each
//! `[profiles.<name>]` field that is present replaces the built-in field of
//! the same name, omitted fields keep the built-in values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{PawlError, Result};

/// Profile name returned when no detection rule matches.
pub const GENERAL_PROFILE: &str = "general";

/// Detection order, most language-specific first.
const DETECTION_ORDER: [&str; 4] = ["python", "typescript", "go", "rust"];

/// Override file path relative to the project root.
const OVERRIDES_FILE: &str = ".pawl/profiles.toml";

fn default_blocking() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    300
}

/// Configuration for a single quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub command: String,
    #[serde(default = "default_blocking")]
    pub blocking: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl GateConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            blocking: default_blocking(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// A project-type profile: how to recognize the project and which gates
/// apply to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub detect_files: Vec<String>,
    #[serde(default)]
    pub detect_extensions: Vec<String>,
    #[serde(default)]
    pub gates: BTreeMap<String, GateConfig>,
    #[serde(default)]
    pub conventions: BTreeMap<String, String>,
}

impl Profile {
    /// A profile with no detection rules and no gates.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detect_files: Vec::new(),
            detect_extensions: Vec::new(),
            gates: BTreeMap::new(),
            conventions: BTreeMap::new(),
        }
    }

    pub fn gate(&self, name: &str) -> Option<&GateConfig> {
        self.gates.get(name)
    }

    /// Names of gates configured with `blocking: true`, in map order.
    pub fn blocking_gate_names(&self) -> Vec<String> {
        self.gates
            .iter()
            .filter(|(_, config)| config.blocking)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// True when any marker file exists at `root` or any direct child
    /// matches one of the profile's extensions.
    fn matches(&self, root: &Path) -> bool {
        for file in &self.detect_files {
            if root.join(file).exists() {
                return true;
            }
        }
        for ext in &self.detect_extensions {
            let pattern = format!("{}/*{}", root.display(), ext);
            if let Ok(paths) = glob::glob(&pattern) {
                if paths.filter_map(|entry| entry.ok()).next().is_some() {
                    return true;
                }
            }
        }
        false
    }
}

fn builtin_profiles() -> BTreeMap<String, Profile> {
    let mut profiles = BTreeMap::new();

    let mut python = Profile::new("python");
    python.detect_files = vec![
        "pyproject.toml".to_string(),
        "setup.py".to_string(),
        "requirements.txt".to_string(),
    ];
    python.detect_extensions = vec![".py".to_string()];
    python
        .gates
        .insert("lint".to_string(), GateConfig::new("ruff check ."));
    python
        .gates
        .insert("test".to_string(), GateConfig::new("pytest"));
    python
        .gates
        .insert("type".to_string(), GateConfig::new("pyright").non_blocking());
    profiles.insert(python.name.clone(), python);

    let mut typescript = Profile::new("typescript");
    typescript.detect_files = vec!["tsconfig.json".to_string(), "package.json".to_string()];
    typescript.detect_extensions = vec![".ts".to_string(), ".tsx".to_string()];
    typescript
        .gates
        .insert("lint".to_string(), GateConfig::new("npm run lint"));
    typescript
        .gates
        .insert("test".to_string(), GateConfig::new("npm test"));
    typescript
        .gates
        .insert("type".to_string(), GateConfig::new("npx tsc --noEmit"));
    profiles.insert(typescript.name.clone(), typescript);

    let mut go = Profile::new("go");
    go.detect_files = vec!["go.mod".to_string()];
    go.detect_extensions = vec![".go".to_string()];
    go.gates
        .insert("lint".to_string(), GateConfig::new("golangci-lint run"));
    go.gates
        .insert("test".to_string(), GateConfig::new("go test ./..."));
    profiles.insert(go.name.clone(), go);

    let mut rust = Profile::new("rust");
    rust.detect_files = vec!["Cargo.toml".to_string()];
    rust.detect_extensions = vec![".rs".to_string()];
    rust.gates
        .insert("lint".to_string(), GateConfig::new("cargo clippy"));
    rust.gates
        .insert("test".to_string(), GateConfig::new("cargo test"));
    profiles.insert(rust.name.clone(), rust);

    profiles.insert(
        GENERAL_PROFILE.to_string(),
        Profile::new(GENERAL_PROFILE),
    );

    profiles
}

/// Override document shape: `[profiles.<name>]` tables.
#[derive(Debug, Deserialize)]
struct OverridesFile {
    #[serde(default)]
    profiles: BTreeMap<String, ProfileOverride>,
}

/// Partial profile: present fields replace the built-in ones.
#[derive(Debug, Deserialize)]
struct ProfileOverride {
    detect_files: Option<Vec<String>>,
    detect_extensions: Option<Vec<String>>,
    gates: Option<BTreeMap<String, GateOverride>>,
    conventions: Option<BTreeMap<String, String>>,
}

/// A gate override is either a bare command string or a full table.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GateOverride {
    Command(String),
    Config(GateConfig),
}

impl GateOverride {
    fn into_config(self, profile: &str, gate: &str) -> Result<GateConfig> {
        let config = match self {
            GateOverride::Command(command) => GateConfig::new(command),
            GateOverride::Config(config) => config,
        };
        if config.command.trim().is_empty() {
            return Err(PawlError::Profile(format!(
                "gate '{}' in profile '{}' has an empty command",
                gate, profile
            )));
        }
        if config.timeout_secs == 0 {
            return Err(PawlError::Profile(format!(
                "gate '{}' in profile '{}' has a zero timeout",
                gate, profile
            )));
        }
        Ok(config)
    }
}

/// Resolves project profiles: detection, cached lookup, gate accessors.
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileResolver {
    /// Resolver over the built-in profile table only.
    pub fn new() -> Self {
        Self {
            profiles: builtin_profiles(),
        }
    }

    /// Resolver with any `.pawl/profiles.toml` under `root` merged over the
    /// built-ins. A missing file yields the defaults; an unreadable or
    /// invalid file is an error, unlike session state this is operator
    /// configuration and must not be silently ignored.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let mut resolver = Self::new();
        let path = root.join(OVERRIDES_FILE);
        if path.exists() {
            resolver.apply_overrides(&path)?;
        }
        Ok(resolver)
    }

    fn apply_overrides(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)?;
        let doc: OverridesFile = toml::from_str(&raw).map_err(|e| {
            PawlError::Profile(format!("failed to parse {}: {}", path.display(), e))
        })?;

        for (name, over) in doc.profiles {
            if name.trim().is_empty() {
                return Err(PawlError::Profile(
                    "profile override with an empty name".to_string(),
                ));
            }
            let mut profile = self
                .profiles
                .get(&name)
                .cloned()
                .unwrap_or_else(|| Profile::new(&name));
            if let Some(files) = over.detect_files {
                profile.detect_files = files;
            }
            if let Some(extensions) = over.detect_extensions {
                profile.detect_extensions = extensions;
            }
            if let Some(gates) = over.gates {
                let mut table = BTreeMap::new();
                for (gate_name, spec) in gates {
                    let config = spec.into_config(&name, &gate_name)?;
                    table.insert(gate_name, config);
                }
                profile.gates = table;
            }
            if let Some(conventions) = over.conventions {
                profile.conventions = conventions;
            }
            tracing::debug!(profile = %name, "applied profile override");
            self.profiles.insert(name, profile);
        }
        Ok(())
    }

    /// Detects the project type under `root`. Profiles are checked in a
    /// fixed priority order and the first match wins; with no match the
    /// `general` fallback is returned.
    pub fn detect(&self, root: &Path) -> String {
        for name in DETECTION_ORDER {
            if let Some(profile) = self.profiles.get(name) {
                if profile.matches(root) {
                    tracing::debug!(profile = name, root = %root.display(), "detected profile");
                    return name.to_string();
                }
            }
        }
        GENERAL_PROFILE.to_string()
    }

    /// Returns a copy of the named profile, or `None` for unknown names.
    /// Absence is not an error; callers decide how to handle it.
    pub fn load(&self, name: &str) -> Option<Profile> {
        self.profiles.get(name).cloned()
    }

    /// Command string for a gate, or `None` when the profile or gate is
    /// not configured.
    pub fn get_gate_command(&self, profile: &str, gate: &str) -> Option<String> {
        self.profiles
            .get(profile)?
            .gates
            .get(gate)
            .map(|config| config.command.clone())
    }

    /// Whether a gate blocks phase advancement. Unconfigured gates report
    /// blocking so an unknown gate name cannot silently become skippable.
    pub fn is_gate_blocking(&self, profile: &str, gate: &str) -> bool {
        self.profiles
            .get(profile)
            .and_then(|p| p.gates.get(gate))
            .map(|config| config.blocking)
            .unwrap_or(true)
    }
}

impl Default for ProfileResolver {
    fn default() -> Self {
        Self::new()
    }
}
