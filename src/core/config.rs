//! Configuration system: TOML file parsing + validation.
//!
//! Config is loaded through a [`crate::fs::FileSystem`] rather than calling
//! `std::fs` directly, so the root/pack config resolution in `pipeline` can
//! run identically against the real filesystem and against
//! [`crate::fs::MemoryFileSystem`] in tests.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DotkError, Result};
use crate::fs::FileSystem;

/// One `{ pattern, handler, options? }` entry as it appears in TOML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSpec {
    pub pattern: String,
    pub handler: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl RuleSpec {
    #[must_use]
    pub fn new(pattern: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            handler: handler.into(),
            options: BTreeMap::new(),
        }
    }
}

/// Knobs specific to the symlink handler: which top-level names always
/// resolve to the home directory (L2), and which exact paths refuse to be
/// linked at all regardless of rule match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SymlinkConfig {
    pub force_home: Vec<String>,
    pub protected_paths: Vec<String>,
}

/// Shape shared by the root config (`<sourceRoot>/dotkeeper.toml`) and pack
/// configs (`<pack>/dotkeeper.toml` or `<pack>/.dotkeeper.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub rules: Vec<RuleSpec>,
    pub symlink: SymlinkConfig,
}

impl Config {
    /// The five built-in rules from narrowest to the catch-all, evaluated
    /// before any user-supplied rule when merged.
    #[must_use]
    pub fn builtin_rules() -> Vec<RuleSpec> {
        vec![
            RuleSpec::new("install.sh", "install"),
            RuleSpec::new("Brewfile", "homebrew"),
            RuleSpec::new("bin/", "path"),
            RuleSpec::new(".local/bin/", "path"),
            RuleSpec::new("profile.sh", "shell"),
            RuleSpec::new("login.sh", "shell"),
            RuleSpec::new("*aliases.sh", "shell"),
            RuleSpec::new("*", "symlink"),
        ]
    }

    #[must_use]
    pub fn default_force_home() -> Vec<String> {
        [
            "ssh",
            "gnupg",
            "gpg",
            "gitconfig",
            "git-credentials",
            "bashrc",
            "bash_profile",
            "zshrc",
            "profile",
            "aws",
            "npmrc",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    #[must_use]
    pub fn default_protected_paths() -> Vec<String> {
        [
            ".ssh/id_rsa",
            ".ssh/id_ed25519",
            ".ssh/id_ecdsa",
            ".gnupg",
            ".aws/credentials",
            ".netrc",
            ".npmrc",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    /// A config populated with every built-in default, ready to be
    /// serialized by `gen-config`.
    #[must_use]
    pub fn with_builtin_defaults() -> Self {
        Self {
            rules: Self::builtin_rules(),
            symlink: SymlinkConfig {
                force_home: Self::default_force_home(),
                protected_paths: Self::default_protected_paths(),
            },
        }
    }

    /// Load and parse a config file, if present. Returns `Ok(None)` when
    /// nothing exists at `path` — missing config is not an error since both
    /// root and pack configs are optional.
    pub fn load_optional(fsys: &dyn FileSystem, path: &Path) -> Result<Option<Self>> {
        if !fsys.exists(path) {
            return Ok(None);
        }
        let raw = fsys
            .read_file(path)
            .map_err(|source| DotkError::io(path, source))?;
        let text = String::from_utf8(raw).map_err(|err| DotkError::ConfigParse {
            context: "toml",
            details: err.to_string(),
        })?;
        let parsed: Self = toml::from_str(&text)?;
        parsed.validate()?;
        Ok(Some(parsed))
    }

    /// Find the first of the given candidate filenames under `dir` that
    /// exists and load it, or return `Ok(None)` if none exist.
    pub fn load_first_match(
        fsys: &dyn FileSystem,
        dir: &Path,
        candidates: &[&str],
    ) -> Result<Option<Self>> {
        for name in candidates {
            let candidate = dir.join(name);
            if let Some(cfg) = Self::load_optional(fsys, &candidate)? {
                return Ok(Some(cfg));
            }
        }
        Ok(None)
    }

    fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            if rule.pattern.is_empty() {
                return Err(DotkError::ConfigParse {
                    context: "rules",
                    details: "rule pattern must not be empty".to_string(),
                });
            }
            if rule.handler.is_empty() {
                return Err(DotkError::ConfigParse {
                    context: "rules",
                    details: format!("rule for pattern {:?} has no handler", rule.pattern),
                });
            }
        }
        Ok(())
    }

    /// Serialize to a TOML string (used by `gen-config`).
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    #[test]
    fn load_optional_returns_none_when_missing() {
        let fsys = MemoryFileSystem::new();
        let result = Config::load_optional(&fsys, Path::new("/root/dotkeeper.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn load_optional_parses_existing_file() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file(
            "/root/dotkeeper.toml",
            "[[rules]]\npattern = \"*.conf\"\nhandler = \"symlink\"\n",
        );
        let cfg = Config::load_optional(&fsys, Path::new("/root/dotkeeper.toml"))
            .unwrap()
            .unwrap();
        assert_eq!(cfg.rules.len(), 1);
        assert_eq!(cfg.rules[0].pattern, "*.conf");
    }

    #[test]
    fn load_optional_rejects_empty_pattern() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file(
            "/root/dotkeeper.toml",
            "[[rules]]\npattern = \"\"\nhandler = \"symlink\"\n",
        );
        let result = Config::load_optional(&fsys, Path::new("/root/dotkeeper.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_first_match_checks_in_order() {
        let fsys = MemoryFileSystem::new();
        fsys.seed_file("/pack/.dotkeeper.toml", "[[rules]]\npattern = \"x\"\nhandler = \"shell\"\n");
        let cfg = Config::load_first_match(
            &fsys,
            Path::new("/pack"),
            &["dotkeeper.toml", ".dotkeeper.toml"],
        )
        .unwrap()
        .unwrap();
        assert_eq!(cfg.rules[0].handler, "shell");
    }

    #[test]
    fn with_builtin_defaults_round_trips_through_toml() {
        let cfg = Config::with_builtin_defaults();
        let text = cfg.to_toml_string().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn builtin_rules_end_with_catch_all() {
        let rules = Config::builtin_rules();
        assert_eq!(rules.last().unwrap().pattern, "*");
        assert_eq!(rules.last().unwrap().handler, "symlink");
    }
}
