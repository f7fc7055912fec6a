//! Rule engine (C5): merges built-in, root, and pack rules into an ordered
//! list and assigns each pack entry to at most one handler.
//!
//! Glob compilation is grounded on a shell-style glob-to-regex translator:
//! `*` expands to a character class that excludes the path separator, so a
//! pattern never accidentally crosses a directory boundary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::core::config::{Config, RuleSpec};
use crate::fs::{EntryKind, FileSystem};
use crate::packs::Pack;

/// A single compiled rule: pattern, handler, exclusion flag, and options,
/// tagged with its position in the merged list (lower sorts first).
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub handler: String,
    pub exclude: bool,
    pub options: BTreeMap<String, String>,
    pub priority: usize,
    is_dir_only: bool,
    regex: Regex,
}

impl Rule {
    fn compile(raw: &RuleSpec, priority: usize) -> Self {
        let (exclude, pattern_body) = raw
            .pattern
            .strip_prefix('!')
            .map_or((false, raw.pattern.as_str()), |rest| (true, rest));
        let is_dir_only = pattern_body.ends_with('/') && pattern_body != "*";
        let trimmed = pattern_body.trim_end_matches('/');
        let regex = glob_to_regex(trimmed);
        Self {
            pattern: raw.pattern.clone(),
            handler: raw.handler.clone(),
            exclude,
            options: raw.options.clone(),
            priority,
            is_dir_only,
            regex,
        }
    }

    fn matches(&self, relative: &Path, kind: EntryKind) -> bool {
        if self.is_dir_only && kind != EntryKind::Dir {
            return false;
        }
        let candidate = relative.to_string_lossy();
        if self.pattern.trim_start_matches('!') == "*" || self.pattern.trim_start_matches('!') == "*/" {
            return true;
        }
        if self.regex_has_separator() {
            self.regex.is_match(&candidate)
        } else {
            relative.components().count() == 1 && self.regex.is_match(&candidate)
        }
    }

    fn regex_has_separator(&self) -> bool {
        self.pattern.trim_start_matches('!').trim_end_matches('/').contains('/')
    }
}

/// Translate a shell-style glob into an anchored regex. `*` matches any run
/// of characters that excludes `/`; every other character is escaped
/// literally.
fn glob_to_regex(glob: &str) -> Regex {
    let mut pattern = String::from("^");
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            c if "\\.+()|[]{}^$".contains(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).unwrap_or_else(|_| Regex::new("$^").expect("empty-match regex is valid"))
}

/// The handler-facing view of a matched entry: everything a handler needs
/// to turn this one file into operations.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub pack: String,
    pub absolute_path: PathBuf,
    pub relative_path: PathBuf,
    pub options: BTreeMap<String, String>,
}

/// One assignment produced by the rule engine.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub pack: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub handler: String,
    pub options: BTreeMap<String, String>,
    pub priority: usize,
}

impl RuleMatch {
    #[must_use]
    pub fn to_file_input(&self) -> FileInput {
        FileInput {
            pack: self.pack.clone(),
            absolute_path: self.absolute_path.clone(),
            relative_path: self.relative_path.clone(),
            options: self.options.clone(),
        }
    }
}

/// Merge pack rules (highest priority, evaluated first), then root rules,
/// then the built-in defaults (lowest priority, evaluated last).
#[must_use]
pub fn merge_rules(pack: Option<&Config>, root: Option<&Config>) -> Vec<Rule> {
    let mut specs: Vec<RuleSpec> = Vec::new();
    if let Some(cfg) = pack {
        specs.extend(cfg.rules.clone());
    }
    if let Some(cfg) = root {
        specs.extend(cfg.rules.clone());
    }
    specs.extend(Config::builtin_rules());
    specs
        .into_iter()
        .enumerate()
        .map(|(priority, spec)| Rule::compile(&spec, priority))
        .collect()
}

/// Walk `pack.path` and assign every entry to at most one handler using
/// `rules`. Directories matched by a trailing-slash pattern are recorded as
/// a single `RuleMatch` and not recursed into; entries matching no rule are
/// silently skipped.
pub fn match_pack(
    fsys: &dyn FileSystem,
    pack: &Pack,
    rules: &[Rule],
) -> std::io::Result<Vec<RuleMatch>> {
    let entries = fsys.walk(&pack.path)?;
    let mut matched_dir_prefixes: Vec<PathBuf> = Vec::new();
    let mut out = Vec::new();

    for entry in &entries {
        if entry.relative.components().count() == 1
            && crate::packs::PACK_CONFIG_CANDIDATES
                .iter()
                .any(|name| entry.relative == Path::new(name))
        {
            continue;
        }
        if matched_dir_prefixes
            .iter()
            .any(|prefix| entry.relative.starts_with(prefix) && entry.relative != *prefix)
        {
            continue;
        }
        let mut excluded_handlers: Vec<&str> = Vec::new();
        for rule in rules {
            if !rule.matches(&entry.relative, entry.kind) {
                continue;
            }
            if rule.exclude {
                excluded_handlers.push(rule.handler.as_str());
                continue;
            }
            if excluded_handlers.contains(&rule.handler.as_str()) {
                continue;
            }
            if rule.is_dir_only {
                matched_dir_prefixes.push(entry.relative.clone());
            }
            out.push(RuleMatch {
                pack: pack.name.clone(),
                relative_path: entry.relative.clone(),
                absolute_path: entry.absolute.clone(),
                handler: rule.handler.clone(),
                options: rule.options.clone(),
                priority: rule.priority,
            });
            break;
        }
    }

    Ok(out)
}
