//! Master structure: the canonical unit graph
//!
//! Maps every canonical unit name to its effective record after search-path
//! precedence, drop-in merging, alias resolution, template instantiation and
//! implicit-dependency injection. Edges live on both endpoints: recording
//! `X Requires Y` also records `Y RequiredBy X`, so the structure can be
//! traversed in either direction without a second index.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::units::{UnitName, UnitType};

/// Relation kinds, forward and reverse, plus ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RelationKind {
    // Requirement, forward direction
    Wants,
    Requires,
    Requisite,
    BindsTo,
    PartOf,
    Upholds,
    Conflicts,
    OnFailure,
    OnSuccess,
    PropagatesReloadTo,
    PropagatesStopTo,
    JoinsNamespaceOf,
    Triggers,
    // Requirement, reverse direction
    WantedBy,
    RequiredBy,
    RequisiteOf,
    BoundBy,
    ConsistsOf,
    UpheldBy,
    TriggeredByOnFailure,
    TriggeredByOnSuccess,
    ReloadPropagatedFrom,
    StopPropagatedFrom,
    TriggeredBy,
    // Ordering
    Before,
    After,
}

impl RelationKind {
    /// Parse a `[Unit]` directive key that declares a relation.
    pub fn parse_directive(key: &str) -> Option<Self> {
        match key {
            "Wants" => Some(Self::Wants),
            "Requires" => Some(Self::Requires),
            "Requisite" => Some(Self::Requisite),
            "BindsTo" => Some(Self::BindsTo),
            "PartOf" => Some(Self::PartOf),
            "Upholds" => Some(Self::Upholds),
            "Conflicts" => Some(Self::Conflicts),
            "OnFailure" => Some(Self::OnFailure),
            "OnSuccess" => Some(Self::OnSuccess),
            "PropagatesReloadTo" => Some(Self::PropagatesReloadTo),
            "PropagatesStopTo" => Some(Self::PropagatesStopTo),
            "ReloadPropagatedFrom" => Some(Self::ReloadPropagatedFrom),
            "StopPropagatedFrom" => Some(Self::StopPropagatedFrom),
            "JoinsNamespaceOf" => Some(Self::JoinsNamespaceOf),
            "Before" => Some(Self::Before),
            "After" => Some(Self::After),
            _ => None,
        }
    }

    /// The relation recorded on the target when this one is recorded on the
    /// source. `Conflicts` is symmetric; `JoinsNamespaceOf` has no reverse.
    pub fn inverse(&self) -> Option<Self> {
        match self {
            Self::Wants => Some(Self::WantedBy),
            Self::Requires => Some(Self::RequiredBy),
            Self::Requisite => Some(Self::RequisiteOf),
            Self::BindsTo => Some(Self::BoundBy),
            Self::PartOf => Some(Self::ConsistsOf),
            Self::Upholds => Some(Self::UpheldBy),
            Self::Conflicts => Some(Self::Conflicts),
            Self::OnFailure => Some(Self::TriggeredByOnFailure),
            Self::OnSuccess => Some(Self::TriggeredByOnSuccess),
            Self::PropagatesReloadTo => Some(Self::ReloadPropagatedFrom),
            Self::PropagatesStopTo => Some(Self::StopPropagatedFrom),
            Self::JoinsNamespaceOf => None,
            Self::Triggers => Some(Self::TriggeredBy),
            Self::WantedBy => Some(Self::Wants),
            Self::RequiredBy => Some(Self::Requires),
            Self::RequisiteOf => Some(Self::Requisite),
            Self::BoundBy => Some(Self::BindsTo),
            Self::ConsistsOf => Some(Self::PartOf),
            Self::UpheldBy => Some(Self::Upholds),
            Self::TriggeredByOnFailure => Some(Self::OnFailure),
            Self::TriggeredByOnSuccess => Some(Self::OnSuccess),
            Self::ReloadPropagatedFrom => Some(Self::PropagatesReloadTo),
            Self::StopPropagatedFrom => Some(Self::PropagatesStopTo),
            Self::TriggeredBy => Some(Self::Triggers),
            Self::Before => Some(Self::After),
            Self::After => Some(Self::Before),
        }
    }

    /// Forward-direction kinds: declared by (or injected into) the source
    /// unit. Reverse kinds only ever appear as recorded inverses.
    pub fn is_forward(&self) -> bool {
        matches!(
            self,
            Self::Wants
                | Self::Requires
                | Self::Requisite
                | Self::BindsTo
                | Self::PartOf
                | Self::Upholds
                | Self::Conflicts
                | Self::OnFailure
                | Self::OnSuccess
                | Self::PropagatesReloadTo
                | Self::PropagatesStopTo
                | Self::JoinsNamespaceOf
                | Self::Triggers
                | Self::Before
                | Self::After
        )
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Before | Self::After)
    }

    /// Negative relations are recorded but never traversed.
    pub fn is_negative(&self) -> bool {
        matches!(self, Self::Conflicts)
    }

    /// The closure set of the dependency resolver: requirement kinds that
    /// pull their target into the dependency map.
    pub fn in_closure(&self) -> bool {
        matches!(
            self,
            Self::Wants
                | Self::Requires
                | Self::Requisite
                | Self::BindsTo
                | Self::PartOf
                | Self::Upholds
                | Self::OnFailure
                | Self::OnSuccess
                | Self::PropagatesReloadTo
                | Self::PropagatesStopTo
                | Self::Triggers
        )
    }
}

/// Where an edge or directive came from: a file on disk, or an implicit
/// rule of the dependency injector. Serialized as a plain string; implicit
/// origins carry an `implicit:` prefix (e.g. `implicit:service-default`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Origin {
    Explicit(PathBuf),
    Implicit(String),
}

impl Origin {
    pub fn implicit(rule: &str) -> Self {
        Self::Implicit(rule.to_string())
    }
}

impl From<String> for Origin {
    fn from(s: String) -> Self {
        match s.strip_prefix("implicit:") {
            Some(rule) => Self::Implicit(rule.to_string()),
            None => Self::Explicit(PathBuf::from(s)),
        }
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        match origin {
            Origin::Explicit(path) => path.display().to_string(),
            Origin::Implicit(rule) => format!("implicit:{}", rule),
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit(path) => write!(f, "{}", path.display()),
            Self::Implicit(rule) => write!(f, "implicit:{}", rule),
        }
    }
}

/// A directed edge from the unit holding it to `target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    pub target: String,
    pub origin: Origin,
    pub section: String,
}

/// One directive value with the file that contributed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveValue {
    pub value: String,
    pub origin: PathBuf,
}

/// An `Exec*` command line with its resolved executable and optional
/// enrichment attached by the artifact enricher hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub directive: String,
    pub command: String,
    pub executable: Option<String>,
    pub libraries: BTreeSet<String>,
    pub strings: BTreeSet<String>,
    pub file_hash: Option<String>,
}

/// Section name -> key -> ordered value list.
pub type DirectiveMap = BTreeMap<String, BTreeMap<String, Vec<DirectiveValue>>>;

/// The effective record of one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRecord {
    pub canonical_name: String,
    pub unit_type: UnitType,
    /// Content-bearing file; `None` for synthetic units. Instances point at
    /// their template file.
    pub source_path: Option<PathBuf>,
    pub is_template: bool,
    pub instance_name: Option<String>,
    /// Symlink paths whose eventual target resolves to this unit.
    pub aliases: BTreeSet<String>,
    /// Merged `.conf` drop-ins, in application order.
    pub dropins: Vec<PathBuf>,
    /// Same-name files shadowed by search-path precedence.
    pub overridden_by: Vec<PathBuf>,
    pub directives: DirectiveMap,
    pub relations: Vec<Relation>,
    pub exec_commands: Vec<CommandRecord>,
    pub masked: bool,
    pub not_found: bool,
    pub warnings: Vec<String>,
}

impl UnitRecord {
    pub fn new(name: &UnitName) -> Self {
        Self {
            canonical_name: name.full_name(),
            unit_type: name.unit_type,
            source_path: None,
            is_template: name.is_template(),
            instance_name: name.instance.clone().filter(|i| !i.is_empty()),
            aliases: BTreeSet::new(),
            dropins: Vec::new(),
            overridden_by: Vec::new(),
            directives: DirectiveMap::new(),
            relations: Vec::new(),
            exec_commands: Vec::new(),
            masked: false,
            not_found: false,
            warnings: Vec::new(),
        }
    }

    /// A placeholder for a referenced name with no file on disk.
    pub fn synthetic(name: &UnitName) -> Self {
        let mut record = Self::new(name);
        record.not_found = true;
        record
    }

    /// All values of a directive, in merge order.
    pub fn directive_values(&self, section: &str, key: &str) -> Vec<&str> {
        self.directives
            .get(section)
            .and_then(|s| s.get(key))
            .map(|vals| vals.iter().map(|v| v.value.as_str()).collect())
            .unwrap_or_default()
    }

    /// The last value of a directive (scalar semantics: last one wins).
    pub fn directive_last(&self, section: &str, key: &str) -> Option<&str> {
        self.directives
            .get(section)?
            .get(key)?
            .last()
            .map(|v| v.value.as_str())
    }

    /// Boolean directive with a default.
    pub fn directive_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.directive_last(section, key)
            .map(crate::units::string_to_bool)
            .unwrap_or(default)
    }

    /// All whitespace-separated entries of a list directive, with the file
    /// each one came from.
    pub fn directive_list(&self, section: &str, key: &str) -> Vec<(String, PathBuf)> {
        let mut entries = Vec::new();
        if let Some(vals) = self.directives.get(section).and_then(|s| s.get(key)) {
            for val in vals {
                for word in val.value.split_whitespace() {
                    entries.push((word.to_string(), val.origin.clone()));
                }
            }
        }
        entries
    }

    pub fn warn(&mut self, message: String) {
        log::warn!("{}: {}", self.canonical_name, message);
        self.warnings.push(message);
    }
}

/// Artifact metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub root_path: String,
    pub generated_at: String,
    pub tool_version: String,
    pub warnings: Vec<String>,
}

impl Meta {
    pub fn now(root_path: String) -> Self {
        Self {
            root_path,
            generated_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            warnings: Vec::new(),
        }
    }
}

/// The master structure: canonical name -> unit record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterStruct {
    pub units: BTreeMap<String, UnitRecord>,
    pub meta: Meta,
}

impl MasterStruct {
    /// Get the record for `name`, creating a synthetic `not_found` record
    /// when the name is missing. Returns `None` for unparseable names.
    pub fn ensure_unit(&mut self, name: &str) -> Option<&mut UnitRecord> {
        if !self.units.contains_key(name) {
            let parsed = UnitName::parse(name)?;
            log::debug!("synthesizing missing unit {}", name);
            self.units
                .insert(name.to_string(), UnitRecord::synthetic(&parsed));
        }
        self.units.get_mut(name)
    }

    /// Record `source --kind--> target` and its inverse on the target.
    /// Duplicate (kind, target) pairs on a unit are collapsed, keeping the
    /// first origin observed. Unparseable target names are dropped with a
    /// warning on the source unit.
    pub fn add_edge(
        &mut self,
        source: &str,
        kind: RelationKind,
        target: &str,
        origin: Origin,
        section: &str,
    ) {
        if source == target {
            return;
        }
        if self.ensure_unit(target).is_none() {
            if let Some(record) = self.units.get_mut(source) {
                record.warn(format!("dependency target '{}' is not a valid unit name", target));
            }
            return;
        }

        self.push_relation(source, kind, target, origin.clone(), section);
        if let Some(inverse) = kind.inverse() {
            self.push_relation(target, inverse, source, origin, section);
        }
    }

    fn push_relation(
        &mut self,
        on: &str,
        kind: RelationKind,
        target: &str,
        origin: Origin,
        section: &str,
    ) {
        let Some(record) = self.units.get_mut(on) else {
            return;
        };
        if record
            .relations
            .iter()
            .any(|r| r.kind == kind && r.target == target)
        {
            return;
        }
        record.relations.push(Relation {
            kind,
            target: target.to_string(),
            origin,
            section: section.to_string(),
        });
    }

    /// Resolve a unit name to its canonical key, looking through alias
    /// basenames (e.g. `default.target` -> `graphical.target`).
    pub fn resolve_name(&self, name: &str) -> Option<&str> {
        if let Some(record) = self.units.get(name) {
            return Some(record.canonical_name.as_str());
        }
        for record in self.units.values() {
            for alias in &record.aliases {
                let basename = alias.rsplit('/').next().unwrap_or(alias.as_str());
                if basename == name {
                    return Some(record.canonical_name.as_str());
                }
            }
        }
        None
    }

    /// Sort relation lists so serialized output is diff-stable.
    pub fn normalize(&mut self) {
        for record in self.units.values_mut() {
            record.relations.sort();
            record.relations.dedup();
        }
    }

    /// Check the assembly invariants; returns human-readable violations.
    /// Used by tests and after deserializing an untrusted MS.
    pub fn verify(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen_aliases: BTreeMap<&str, &str> = BTreeMap::new();

        for (key, record) in &self.units {
            if *key != record.canonical_name {
                problems.push(format!(
                    "key '{}' does not match canonical name '{}'",
                    key, record.canonical_name
                ));
            }
            if record.source_path.is_none() && !record.not_found && !record.masked {
                problems.push(format!("unit '{}' has no source and is not synthetic", key));
            }
            for alias in &record.aliases {
                if let Some(other) = seen_aliases.insert(alias.as_str(), key.as_str()) {
                    problems.push(format!(
                        "alias '{}' claimed by both '{}' and '{}'",
                        alias, other, key
                    ));
                }
            }
            for relation in &record.relations {
                let Some(target) = self.units.get(&relation.target) else {
                    problems.push(format!(
                        "edge {} --{:?}--> {} has no target record",
                        key, relation.kind, relation.target
                    ));
                    continue;
                };
                if let Some(inverse) = relation.kind.inverse() {
                    let mirrored = target
                        .relations
                        .iter()
                        .any(|r| r.kind == inverse && r.target == *key);
                    if !mirrored {
                        problems.push(format!(
                            "edge {} --{:?}--> {} lacks its {:?} mirror",
                            key, relation.kind, relation.target, inverse
                        ));
                    }
                }
            }
        }

        problems
    }
}
