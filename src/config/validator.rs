//! Whole-configuration validation.
//!
//! The validator runs in one pass and accumulates every independent error it
//! can find; only unparsable input fails fast (see `config::load_document`).
//! An invalid configuration never yields partially-applied rules: the report
//! carries `RuleSet::disabled()` alongside the error list.

use super::canonical::{AliasResolver, CanonicalPaths, NoAliasResolver};
use super::{
    ConfigDocument, ConfigError, ConfigErrorKind, ConfigWarning, RawRule,
    DEFAULT_SCAN_INTERVAL_MILLIS, MAX_NAME_LEN, MAX_SCAN_INTERVAL_MILLIS,
    MIN_SCAN_INTERVAL_MILLIS,
};
use crate::filter::{DateField, DateFilter, FilterParseError, MAX_THRESHOLD_MINUTES};
use crate::rules::spec::{CollisionPolicy, ExtensionSet, RuleSpec};
use crate::rules::RuleSet;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Characters never allowed in a configured folder path.
const WILDCARD_CHARS: [char; 6] = ['*', '?', '<', '>', '|', '"'];

/// Device-style names rejected in any path component, regardless of
/// extension.
const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9 ]+$").expect("static pattern"))
}

/// Outcome of validating a configuration document.
#[derive(Debug)]
pub struct ValidationReport {
    /// The validated set, or `RuleSet::disabled()` when `errors` is
    /// non-empty.
    pub rule_set: RuleSet,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<ConfigWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates raw configuration documents into rule sets.
pub struct ConfigValidator {
    resolver: Arc<dyn AliasResolver>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(NoAliasResolver),
        }
    }

    /// Use a custom alias resolver (drive mappings, test tables).
    pub fn with_alias_resolver(resolver: Arc<dyn AliasResolver>) -> Self {
        Self { resolver }
    }

    /// Validate the whole document, accumulating as many independent errors
    /// as possible.
    pub fn validate(&self, doc: &ConfigDocument) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Field-level pass: each raw rule either promotes or contributes
        // errors; promotion failures never hide later rules' problems.
        let mut promoted: Vec<RuleSpec> = Vec::new();
        let mut names_seen: HashMap<String, usize> = HashMap::new();
        for (index, raw) in doc.rules.iter().enumerate() {
            let label = rule_label(raw, index);

            if let Some(name) = raw.name.as_deref() {
                let key = name.trim().to_ascii_lowercase();
                if !key.is_empty() {
                    if let Some(first) = names_seen.get(&key) {
                        errors.push(ConfigError {
                            rule: label.clone(),
                            field: "name",
                            kind: ConfigErrorKind::DuplicateName(first + 1),
                        });
                    } else {
                        names_seen.insert(key, index);
                    }
                }
            }

            if let Some(rule) = validate_rule(raw, &label, &mut errors) {
                promoted.push(rule);
            }
        }

        // Cross-rule pass over the active promoted rules, on canonical
        // identities rather than raw strings.
        let mut paths = CanonicalPaths::new(self.resolver.clone());
        let active: Vec<&RuleSpec> = promoted.iter().filter(|r| r.active).collect();

        let source_ids: Vec<usize> = active.iter().map(|r| paths.intern(&r.source)).collect();
        let dest_ids: Vec<usize> = active.iter().map(|r| paths.intern(&r.destination)).collect();

        check_extension_clashes(&active, &source_ids, &mut errors);
        check_catch_all_uniqueness(&active, &source_ids, &mut errors);
        check_direct_loops(&active, &source_ids, &dest_ids, &mut errors);
        check_move_cycles(&active, &source_ids, &dest_ids, &paths, &mut errors);

        for alias in paths.discovered_aliases() {
            warnings.push(ConfigWarning::AliasedPaths {
                raw: alias.raw.clone(),
                first_seen_as: alias.first_seen_as.clone(),
            });
        }

        // A configuration with rules but no structurally workable active
        // rule is rejected outright, even when the individual problems sit
        // on inactive rules.
        if !doc.rules.is_empty() {
            let any_workable = active
                .iter()
                .any(|r| std::fs::metadata(&r.source).map(|m| m.is_dir()).unwrap_or(false));
            if !any_workable {
                errors.push(ConfigError {
                    rule: "configuration".to_string(),
                    field: "rules",
                    kind: ConfigErrorKind::NoWorkableRule,
                });
            }
        }

        let rule_set = if errors.is_empty() {
            RuleSet::build(promoted)
        } else {
            RuleSet::disabled()
        };

        ValidationReport {
            rule_set,
            errors,
            warnings,
        }
    }
}

fn rule_label(raw: &RawRule, index: usize) -> String {
    match raw.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => format!("rule '{name}'"),
        _ => format!("rule #{}", index + 1),
    }
}

/// Validate one raw rule's own fields; cross-rule checks happen later.
fn validate_rule(raw: &RawRule, label: &str, errors: &mut Vec<ConfigError>) -> Option<RuleSpec> {
    let before = errors.len();

    let name = validate_name(raw.name.as_deref(), label, errors);
    let source = validate_folder(raw.source_folder.as_deref(), label, "sourceFolder", errors);
    let destination = validate_folder(
        raw.destination_folder.as_deref(),
        label,
        "destinationFolder",
        errors,
    );
    let extensions = validate_extensions(raw.extensions.as_deref(), label, errors);
    let date_filter = validate_date_criteria(raw, label, errors);
    let scan_interval_millis = validate_interval(raw.scan_interval_millis.as_ref(), label, errors);
    let on_collision = validate_collision(raw.on_collision.as_deref(), label, errors);
    let active = raw.active.unwrap_or(true);

    if let Some(ExtensionSet::CatchAll) = &extensions {
        if matches!(date_filter, Some(None)) {
            errors.push(ConfigError {
                rule: label.to_string(),
                field: "dateFilter",
                kind: ConfigErrorKind::CatchAllNeedsFilter,
            });
        }
    }

    if errors.len() > before {
        return None;
    }

    Some(RuleSpec {
        name: name?,
        source: source?,
        destination: destination?,
        extensions: extensions?,
        date_filter: date_filter?,
        scan_interval_millis,
        on_collision,
        active,
    })
}

fn validate_name(raw: Option<&str>, label: &str, errors: &mut Vec<ConfigError>) -> Option<String> {
    let push = |errors: &mut Vec<ConfigError>, kind| {
        errors.push(ConfigError {
            rule: label.to_string(),
            field: "name",
            kind,
        });
    };

    let Some(name) = raw.map(str::trim).filter(|n| !n.is_empty()) else {
        push(errors, ConfigErrorKind::Missing);
        return None;
    };
    if name.chars().count() > MAX_NAME_LEN {
        push(errors, ConfigErrorKind::NameTooLong);
        return None;
    }
    if !name_pattern().is_match(name) {
        push(errors, ConfigErrorKind::NameFormat(name.to_string()));
        return None;
    }
    Some(name.to_string())
}

fn validate_folder(
    raw: Option<&str>,
    label: &str,
    field: &'static str,
    errors: &mut Vec<ConfigError>,
) -> Option<PathBuf> {
    let push = |errors: &mut Vec<ConfigError>, kind| {
        errors.push(ConfigError {
            rule: label.to_string(),
            field,
            kind,
        });
    };

    let Some(text) = raw.map(str::trim).filter(|p| !p.is_empty()) else {
        push(errors, ConfigErrorKind::Missing);
        return None;
    };
    if text.contains(&WILDCARD_CHARS[..]) {
        push(errors, ConfigErrorKind::WildcardInPath(text.to_string()));
        return None;
    }
    let path = PathBuf::from(text);
    if !path.is_absolute() {
        push(errors, ConfigErrorKind::RelativePath(text.to_string()));
        return None;
    }
    if let Some(component) = reserved_component(&path) {
        push(errors, ConfigErrorKind::ReservedName(component));
        return None;
    }
    Some(path)
}

/// The first reserved device-style component in `path`, if any. The check
/// ignores anything after the first dot, so `NUL.txt` is still reserved.
fn reserved_component(path: &Path) -> Option<String> {
    for component in path.components() {
        let text = component.as_os_str().to_string_lossy();
        let stem = text.split('.').next().unwrap_or("").to_ascii_uppercase();
        if RESERVED_NAMES.contains(&stem.as_str()) {
            return Some(text.to_string());
        }
    }
    None
}

fn validate_extensions(
    raw: Option<&[String]>,
    label: &str,
    errors: &mut Vec<ConfigError>,
) -> Option<ExtensionSet> {
    let push = |errors: &mut Vec<ConfigError>, kind| {
        errors.push(ConfigError {
            rule: label.to_string(),
            field: "extensions",
            kind,
        });
    };

    let Some(tokens) = raw.filter(|t| !t.is_empty()) else {
        push(errors, ConfigErrorKind::Missing);
        return None;
    };

    if tokens.iter().any(|t| t.trim() == "*") {
        if tokens.len() > 1 {
            push(errors, ConfigErrorKind::MixedCatchAll);
            return None;
        }
        return Some(ExtensionSet::CatchAll);
    }

    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut ok = true;
    for token in tokens {
        match ExtensionSet::normalize_token(token) {
            Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
                // Duplicates inside one rule collapse silently.
                if seen.insert(ext.clone()) {
                    ordered.push(ext);
                }
            }
            _ => {
                push(errors, ConfigErrorKind::InvalidExtension(token.clone()));
                ok = false;
            }
        }
    }
    ok.then_some(ExtensionSet::Specific(ordered))
}

/// Resolve the rule's date criterion into a single filter.
///
/// The legacy per-field minutes and the `dateFilter` expression are four
/// spellings of one concept; at most one may be set, and all collapse into
/// the single tagged `DateFilter`.
fn validate_date_criteria(
    raw: &RawRule,
    label: &str,
    errors: &mut Vec<ConfigError>,
) -> Option<Option<DateFilter>> {
    let push = |errors: &mut Vec<ConfigError>, field, kind| {
        errors.push(ConfigError {
            rule: label.to_string(),
            field,
            kind,
        });
    };

    let expression = raw
        .date_filter
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let legacy: Vec<(&'static str, DateField, &serde_json::Value)> = [
        ("createdMinutes", DateField::Created, raw.created_minutes.as_ref()),
        ("modifiedMinutes", DateField::LastModified, raw.modified_minutes.as_ref()),
        ("accessedMinutes", DateField::LastAccessed, raw.accessed_minutes.as_ref()),
    ]
    .into_iter()
    .filter_map(|(field, date_field, value)| value.map(|v| (field, date_field, v)))
    .collect();

    let criteria_count = legacy.len() + usize::from(expression.is_some());
    if criteria_count > 1 {
        push(errors, "dateFilter", ConfigErrorKind::MultipleDateCriteria);
        return None;
    }

    if let Some(expr) = expression {
        return match DateFilter::parse(expr) {
            Ok(filter) => Some(filter),
            Err(e) => {
                push(errors, "dateFilter", ConfigErrorKind::Filter(e));
                None
            }
        };
    }

    if let Some((field, date_field, value)) = legacy.into_iter().next() {
        let minutes = match raw_i64(value) {
            Some(v) => v,
            None => {
                push(errors, field, ConfigErrorKind::NotANumber(value.to_string()));
                return None;
            }
        };
        if minutes == 0 {
            push(
                errors,
                field,
                ConfigErrorKind::Filter(FilterParseError::ZeroThreshold),
            );
            return None;
        }
        if minutes.abs() > MAX_THRESHOLD_MINUTES {
            push(
                errors,
                field,
                ConfigErrorKind::Filter(FilterParseError::OutOfRange(minutes.abs())),
            );
            return None;
        }
        return Some(Some(DateFilter {
            field: date_field,
            threshold_minutes: minutes,
        }));
    }

    Some(None)
}

fn validate_interval(
    raw: Option<&serde_json::Value>,
    label: &str,
    errors: &mut Vec<ConfigError>,
) -> u64 {
    let Some(value) = raw else {
        return DEFAULT_SCAN_INTERVAL_MILLIS;
    };
    let push = |errors: &mut Vec<ConfigError>, kind| {
        errors.push(ConfigError {
            rule: label.to_string(),
            field: "scanIntervalMillis",
            kind,
        });
    };

    match raw_i64(value) {
        None => {
            push(errors, ConfigErrorKind::NotANumber(value.to_string()));
            DEFAULT_SCAN_INTERVAL_MILLIS
        }
        Some(v) if !(MIN_SCAN_INTERVAL_MILLIS..=MAX_SCAN_INTERVAL_MILLIS).contains(&v) => {
            push(
                errors,
                ConfigErrorKind::OutOfRange {
                    value: v,
                    min: MIN_SCAN_INTERVAL_MILLIS,
                    max: MAX_SCAN_INTERVAL_MILLIS,
                },
            );
            DEFAULT_SCAN_INTERVAL_MILLIS
        }
        Some(v) => v as u64,
    }
}

fn validate_collision(
    raw: Option<&str>,
    label: &str,
    errors: &mut Vec<ConfigError>,
) -> CollisionPolicy {
    match raw.map(str::trim) {
        None => CollisionPolicy::Skip,
        Some(token) => match CollisionPolicy::from_token(token) {
            Some(policy) => policy,
            None => {
                errors.push(ConfigError {
                    rule: label.to_string(),
                    field: "onCollision",
                    kind: ConfigErrorKind::InvalidCollisionPolicy(token.to_string()),
                });
                CollisionPolicy::Skip
            }
        },
    }
}

/// A JSON number or numeric string as an i64; anything else is `None`.
fn raw_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn check_extension_clashes(
    active: &[&RuleSpec],
    source_ids: &[usize],
    errors: &mut Vec<ConfigError>,
) {
    let mut claimed: HashMap<(usize, &str), &str> = HashMap::new();
    for (rule, &source_id) in active.iter().zip(source_ids) {
        let ExtensionSet::Specific(extensions) = &rule.extensions else {
            continue;
        };
        for ext in extensions {
            match claimed.get(&(source_id, ext.as_str())) {
                Some(other) => errors.push(ConfigError {
                    rule: format!("rule '{}'", rule.name),
                    field: "extensions",
                    kind: ConfigErrorKind::DuplicateExtension {
                        ext: ext.clone(),
                        other: (*other).to_string(),
                    },
                }),
                None => {
                    claimed.insert((source_id, ext.as_str()), rule.name.as_str());
                }
            }
        }
    }
}

fn check_catch_all_uniqueness(
    active: &[&RuleSpec],
    source_ids: &[usize],
    errors: &mut Vec<ConfigError>,
) {
    let mut catch_alls: HashMap<usize, &str> = HashMap::new();
    for (rule, &source_id) in active.iter().zip(source_ids) {
        if !rule.is_catch_all() {
            continue;
        }
        match catch_alls.get(&source_id) {
            Some(other) => errors.push(ConfigError {
                rule: format!("rule '{}'", rule.name),
                field: "extensions",
                kind: ConfigErrorKind::SecondCatchAll((*other).to_string()),
            }),
            None => {
                catch_alls.insert(source_id, rule.name.as_str());
            }
        }
    }
}

fn check_direct_loops(
    active: &[&RuleSpec],
    source_ids: &[usize],
    dest_ids: &[usize],
    errors: &mut Vec<ConfigError>,
) {
    for (i, rule) in active.iter().enumerate() {
        if dest_ids[i] == source_ids[i] {
            errors.push(ConfigError {
                rule: format!("rule '{}'", rule.name),
                field: "destinationFolder",
                kind: ConfigErrorKind::DestinationEqualsSource,
            });
            continue;
        }
        for (j, other) in active.iter().enumerate() {
            if i != j && dest_ids[i] == source_ids[j] {
                errors.push(ConfigError {
                    rule: format!("rule '{}'", rule.name),
                    field: "destinationFolder",
                    kind: ConfigErrorKind::DestinationFeedsRule(other.name.clone()),
                });
            }
        }
    }
}

/// Build the move graph over canonical nodes and report the first cycle as
/// an ordered path.
fn check_move_cycles(
    active: &[&RuleSpec],
    source_ids: &[usize],
    dest_ids: &[usize],
    paths: &CanonicalPaths,
    errors: &mut Vec<ConfigError>,
) {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut node_for: HashMap<usize, NodeIndex> = HashMap::new();

    let mut node = |graph: &mut DiGraph<usize, ()>, id: usize| -> NodeIndex {
        *node_for.entry(id).or_insert_with(|| graph.add_node(id))
    };

    let mut edges = HashSet::new();
    for i in 0..active.len() {
        if source_ids[i] != dest_ids[i] && edges.insert((source_ids[i], dest_ids[i])) {
            let from = node(&mut graph, source_ids[i]);
            let to = node(&mut graph, dest_ids[i]);
            graph.add_edge(from, to, ());
        }
    }

    if let Some(cycle) = first_cycle(&graph) {
        let display: Vec<String> = cycle
            .iter()
            .map(|&n| paths.display_path(graph[n]).display().to_string())
            .collect();
        errors.push(ConfigError {
            rule: "configuration".to_string(),
            field: "rules",
            kind: ConfigErrorKind::MoveCycle(display),
        });
    }
}

/// Depth-first search with an explicit recursion stack; returns the first
/// cycle found as an ordered node path, first node repeated at the end.
fn first_cycle(graph: &DiGraph<usize, ()>) -> Option<Vec<NodeIndex>> {
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut on_stack: Vec<NodeIndex> = Vec::new();

    fn dfs(
        graph: &DiGraph<usize, ()>,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        on_stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        visited.insert(node);
        on_stack.push(node);

        for next in graph.neighbors(node) {
            if let Some(pos) = on_stack.iter().position(|&n| n == next) {
                let mut cycle: Vec<NodeIndex> = on_stack[pos..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            if !visited.contains(&next) {
                if let Some(cycle) = dfs(graph, next, visited, on_stack) {
                    return Some(cycle);
                }
            }
        }

        on_stack.pop();
        None
    }

    let mut nodes: Vec<NodeIndex> = graph.node_indices().collect();
    nodes.sort();
    for start in nodes {
        if !visited.contains(&start) {
            if let Some(cycle) = dfs(graph, start, &mut visited, &mut on_stack) {
                return Some(cycle);
            }
        }
    }
    None
}
