//! Snapshot builder
//!
//! Walks the systemd search paths under a filesystem root and assembles the
//! master structure: every unit file, symlink alias, drop-in directory and
//! `.wants`/`.requires` membership folded into canonical unit records, with
//! template instances synthesized on reference and implicit dependencies
//! injected per unit type. The tree is only ever read; nothing under the
//! root is executed or modified.

pub mod dropins;
pub mod implicit;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::enrich::{self, ArtifactEnricher, COMMAND_DIRECTIVES};
use crate::master::{CommandRecord, MasterStruct, Meta, Origin, RelationKind, UnitRecord};
use crate::paths;
use crate::units::{expand_specifiers, parse_file, parse_unit_file, UnitName, UnitType};
use dropins::RankedDir;

/// Warning placed in `meta.warnings` of every snapshot: generator output
/// cannot exist in an offline tree, so units a generator would produce at
/// boot are invisible to this tool.
const GENERATOR_WARNING: &str =
    "generator output under /run/systemd/generator* is not enumerated; offline trees cannot run generators";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("root path '{0}' is not an accessible directory")]
    RootInaccessible(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A unit file discovered on disk, after first-wins precedence.
#[derive(Debug)]
struct FileEntry {
    path: PathBuf,
    masked: bool,
    overridden_by: Vec<PathBuf>,
}

/// Where a top-level symlink leads.
#[derive(Debug)]
enum LinkTarget {
    Resolved { path: PathBuf, name: String },
    Masked,
    Dangling { intended: Option<String> },
    Escaping { intended: Option<String> },
}

#[derive(Debug)]
struct AliasEntry {
    link_path: PathBuf,
    link_name: UnitName,
    target: LinkTarget,
}

/// One entry of a `.wants/` or `.requires/` directory.
#[derive(Debug)]
struct DepLink {
    owner: String,
    kind: RelationKind,
    entry: String,
    link_path: PathBuf,
}

#[derive(Debug, Default)]
struct Discovery {
    files: BTreeMap<String, FileEntry>,
    aliases: Vec<AliasEntry>,
    dropin_dirs: BTreeMap<String, Vec<RankedDir>>,
    typewide_dirs: BTreeMap<UnitType, Vec<RankedDir>>,
    dep_links: Vec<DepLink>,
}

/// Builds a [`MasterStruct`] from a filesystem root.
pub struct SnapshotBuilder {
    root: PathBuf,
    enricher: Option<Box<dyn ArtifactEnricher>>,
    discovery: Discovery,
    /// alias basename -> canonical unit name, for reference resolution
    alias_index: BTreeMap<String, String>,
    warnings: Vec<String>,
}

impl SnapshotBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            enricher: None,
            discovery: Discovery::default(),
            alias_index: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Attach a binary inspection hook (see [`crate::enrich`]).
    pub fn with_enricher(mut self, enricher: Box<dyn ArtifactEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Crawl the tree and assemble the master structure.
    pub async fn build(mut self) -> Result<MasterStruct, SnapshotError> {
        if !self.root.is_dir() {
            return Err(SnapshotError::RootInaccessible(self.root.clone()));
        }

        let search = paths::search_paths(&self.root);
        log::info!(
            "building snapshot of {} ({} search paths)",
            self.root.display(),
            search.len()
        );

        self.discover(&search);

        let mut ms = MasterStruct {
            units: BTreeMap::new(),
            meta: Meta::now(self.root.display().to_string()),
        };

        let alias_map = self.bind_aliases();

        // Unit records from content files, drop-ins merged.
        let names: Vec<String> = self.discovery.files.keys().cloned().collect();
        for name in names {
            self.load_unit(&mut ms, &name, &alias_map).await;
        }

        // Aliases whose target never materialised as a file.
        self.attach_dangling_aliases(&mut ms);

        // Explicit edges: .wants/.requires memberships, then [Unit] relations.
        self.apply_dep_links(&mut ms);
        self.extract_relations(&mut ms);

        // Implicit edges per unit type.
        for edge in implicit::plan(&ms) {
            if let Some(target) = self.ensure_target(&mut ms, &edge.target) {
                ms.add_edge(
                    &edge.source,
                    edge.kind,
                    &target,
                    Origin::implicit(edge.rule),
                    "Unit",
                );
            }
        }

        self.enrich_commands(&mut ms);

        // Diagnostics live on the affected unit and are summarised in meta.
        ms.meta.warnings = std::mem::take(&mut self.warnings);
        for (name, record) in &ms.units {
            for warning in &record.warnings {
                ms.meta.warnings.push(format!("{}: {}", name, warning));
            }
        }
        ms.meta.warnings.push(GENERATOR_WARNING.to_string());
        ms.normalize();

        log::info!("snapshot complete: {} units", ms.units.len());
        Ok(ms)
    }

    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    // ---- discovery ----------------------------------------------------

    fn discover(&mut self, search: &[PathBuf]) {
        for (precedence, dir) in search.iter().enumerate() {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    self.warn(format!("cannot read search path {}: {}", dir.display(), e));
                    continue;
                }
            };

            let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
            paths.sort();

            for path in paths {
                self.classify(precedence, &path);
            }
        }
    }

    fn classify(&mut self, precedence: usize, path: &Path) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            log::debug!("skipping non-UTF8 entry {}", path.display());
            return;
        };
        let Ok(meta) = fs::symlink_metadata(path) else {
            self.warn(format!("cannot stat {}", path.display()));
            return;
        };

        if meta.file_type().is_symlink() {
            self.classify_symlink(path, name);
        } else if meta.is_dir() {
            self.classify_dir(precedence, path, name);
        } else {
            self.classify_file(path, name, meta.len());
        }
    }

    fn classify_dir(&mut self, precedence: usize, path: &Path, name: &str) {
        if let Some(stem) = name.strip_suffix(".d") {
            let ranked = RankedDir {
                precedence,
                path: path.to_path_buf(),
            };
            if let Some(unit) = UnitName::parse(stem) {
                self.discovery
                    .dropin_dirs
                    .entry(unit.full_name())
                    .or_default()
                    .push(ranked);
            } else if let Some(unit_type) = UnitType::parse(stem) {
                self.discovery
                    .typewide_dirs
                    .entry(unit_type)
                    .or_default()
                    .push(ranked);
            } else {
                self.warn(format!("unrecognized drop-in directory {}", path.display()));
            }
            return;
        }

        let dep_kind = if let Some(stem) = name.strip_suffix(".wants") {
            Some((stem, RelationKind::Wants))
        } else {
            name.strip_suffix(".requires")
                .map(|stem| (stem, RelationKind::Requires))
        };

        if let Some((stem, kind)) = dep_kind {
            let Some(owner) = UnitName::parse(stem) else {
                self.warn(format!("dependency directory {} has no owning unit", path.display()));
                return;
            };
            self.collect_dep_links(path, owner.full_name(), kind);
            return;
        }

        log::debug!("skipping directory {}", path.display());
    }

    fn collect_dep_links(&mut self, dir: &Path, owner: String, kind: RelationKind) {
        let Ok(entries) = fs::read_dir(dir) else {
            self.warn(format!("cannot read dependency directory {}", dir.display()));
            return;
        };
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();

        for link_path in paths {
            let Some(entry) = link_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if UnitName::parse(entry).is_none() {
                self.warn(format!(
                    "entry {} in {} is not a unit name",
                    entry,
                    dir.display()
                ));
                continue;
            }
            self.discovery.dep_links.push(DepLink {
                owner: owner.clone(),
                kind,
                entry: entry.to_string(),
                link_path,
            });
        }
    }

    fn classify_file(&mut self, path: &Path, name: &str, len: u64) {
        let Some(unit) = UnitName::parse(name) else {
            log::debug!("skipping non-unit file {}", path.display());
            return;
        };

        match self.discovery.files.entry(unit.full_name()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(FileEntry {
                    path: path.to_path_buf(),
                    masked: len == 0,
                    overridden_by: Vec::new(),
                });
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => {
                slot.get_mut().overridden_by.push(path.to_path_buf());
            }
        }
    }

    fn classify_symlink(&mut self, path: &Path, name: &str) {
        let Some(link_name) = UnitName::parse(name) else {
            log::debug!("skipping non-unit symlink {}", path.display());
            return;
        };

        match resolve_link(&self.root, path) {
            ResolvedLink::Masked => {
                // A null-device link masks the unit named by the link itself.
                match self.discovery.files.entry(link_name.full_name()) {
                    std::collections::btree_map::Entry::Vacant(slot) => {
                        slot.insert(FileEntry {
                            path: path.to_path_buf(),
                            masked: true,
                            overridden_by: Vec::new(),
                        });
                    }
                    std::collections::btree_map::Entry::Occupied(mut slot) => {
                        slot.get_mut().overridden_by.push(path.to_path_buf());
                    }
                }
            }
            ResolvedLink::File { path: target } => {
                let target_name = target
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .unwrap_or_default();
                self.discovery.aliases.push(AliasEntry {
                    link_path: path.to_path_buf(),
                    link_name,
                    target: LinkTarget::Resolved {
                        path: target,
                        name: target_name,
                    },
                });
            }
            ResolvedLink::Dangling { intended } => {
                self.discovery.aliases.push(AliasEntry {
                    link_path: path.to_path_buf(),
                    link_name,
                    target: LinkTarget::Dangling { intended },
                });
            }
            ResolvedLink::Escaping { intended } => {
                self.discovery.aliases.push(AliasEntry {
                    link_path: path.to_path_buf(),
                    link_name,
                    target: LinkTarget::Escaping { intended },
                });
            }
        }
    }

    // ---- aliases ------------------------------------------------------

    /// Validate resolved aliases, promote targets living outside the search
    /// paths to content files, and index alias basenames for reference
    /// resolution. Returns canonical name -> alias link paths.
    fn bind_aliases(&mut self) -> BTreeMap<String, BTreeSet<String>> {
        let mut alias_map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let entries = std::mem::take(&mut self.discovery.aliases);
        let mut kept = Vec::new();

        for entry in entries {
            let LinkTarget::Resolved { path, name } = &entry.target else {
                kept.push(entry);
                continue;
            };

            let Some(target_name) = UnitName::parse(name) else {
                self.warn(format!(
                    "BadAlias: {} points at non-unit {}",
                    entry.link_path.display(),
                    name
                ));
                continue;
            };
            // default.target designates the boot goal and may point at any
            // unit; every other alias must stay within its type and class.
            let is_boot_goal = entry.link_name.full_name() == "default.target";
            if !is_boot_goal && !alias_compatible(&entry.link_name, &target_name) {
                self.warn(format!(
                    "BadAlias: {} cannot alias {}",
                    entry.link_path.display(),
                    name
                ));
                continue;
            }

            let canonical = target_name.full_name();
            if !self.discovery.files.contains_key(&canonical) {
                // Content lives outside the search paths; adopt it.
                let masked = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false);
                self.discovery.files.insert(
                    canonical.clone(),
                    FileEntry {
                        path: path.clone(),
                        masked,
                        overridden_by: Vec::new(),
                    },
                );
            }

            alias_map
                .entry(canonical.clone())
                .or_default()
                .insert(entry.link_path.display().to_string());
            self.alias_index
                .entry(entry.link_name.full_name())
                .or_insert(canonical);
        }

        self.discovery.aliases = kept;
        alias_map
    }

    /// Aliases whose target could not be resolved become synthetic
    /// `not_found` units named after the intended target.
    fn attach_dangling_aliases(&mut self, ms: &mut MasterStruct) {
        let entries = std::mem::take(&mut self.discovery.aliases);
        for entry in entries {
            let (intended, diagnostic) = match &entry.target {
                LinkTarget::Dangling { intended } => (intended, "DanglingSymlink"),
                LinkTarget::Escaping { intended } => (intended, "EscapingSymlink"),
                _ => continue,
            };

            let target_name = intended
                .as_deref()
                .and_then(UnitName::parse)
                .map(|n| n.full_name());
            let Some(target_name) = target_name else {
                self.warn(format!(
                    "{}: {} has no resolvable unit target",
                    diagnostic,
                    entry.link_path.display()
                ));
                continue;
            };

            if let Some(record) = ms.ensure_unit(&target_name) {
                record
                    .aliases
                    .insert(entry.link_path.display().to_string());
                record.warn(format!(
                    "{}: {}",
                    diagnostic,
                    entry.link_path.display()
                ));
                self.alias_index
                    .entry(entry.link_name.full_name())
                    .or_insert(target_name);
            }
        }
    }

    // ---- unit loading -------------------------------------------------

    async fn load_unit(
        &self,
        ms: &mut MasterStruct,
        name: &str,
        alias_map: &BTreeMap<String, BTreeSet<String>>,
    ) {
        let Some(parsed_name) = UnitName::parse(name) else {
            return;
        };
        let Some(entry) = self.discovery.files.get(name) else {
            return;
        };

        let mut record = UnitRecord::new(&parsed_name);
        record.source_path = Some(entry.path.clone());
        record.overridden_by = entry.overridden_by.clone();
        record.masked = entry.masked;
        if let Some(aliases) = alias_map.get(name) {
            record.aliases = aliases.clone();
        }

        if record.masked {
            log::debug!("{} is masked", name);
            ms.units.insert(name.to_string(), record);
            return;
        }

        let primary = entry.path.clone();
        match parse_unit_file(&primary).await {
            Ok(directives) => {
                dropins::apply_directives(&mut record.directives, &directives, &primary)
            }
            Err(e) => record.warn(format!("MalformedUnit: {}", e)),
        }

        for conf in self.dropin_files_for(&parsed_name, &record.aliases) {
            match parse_unit_file(&conf).await {
                Ok(directives) => {
                    dropins::apply_directives(&mut record.directives, &directives, &conf);
                    record.dropins.push(conf);
                }
                Err(e) => {
                    record.warn(format!("MalformedUnit in drop-in {}: {}", conf.display(), e))
                }
            }
        }

        // Specifiers resolve after the merge so drop-ins may use them too.
        if parsed_name.is_instance() {
            expand_record(&mut record, &parsed_name);
        }

        warn_unknown_directives(&mut record);

        ms.units.insert(name.to_string(), record);
    }

    /// The `.conf` fragments applicable to a unit, in application order:
    /// type-wide, then the template's name (for instances), then the unit's
    /// own name, then each alias name. Directories layer low precedence
    /// first within each group.
    fn dropin_files_for(&self, name: &UnitName, aliases: &BTreeSet<String>) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();

        if let Some(ranked) = self.discovery.typewide_dirs.get(&name.unit_type) {
            dirs.extend(dropins::application_order(ranked));
        }
        if let Some(template) = name.template_name() {
            if let Some(ranked) = self.discovery.dropin_dirs.get(&template) {
                dirs.extend(dropins::application_order(ranked));
            }
        }
        if let Some(ranked) = self.discovery.dropin_dirs.get(&name.full_name()) {
            dirs.extend(dropins::application_order(ranked));
        }
        for alias in aliases {
            let basename = alias.rsplit('/').next().unwrap_or(alias.as_str());
            if basename == name.full_name() {
                continue;
            }
            if let Some(ranked) = self.discovery.dropin_dirs.get(basename) {
                dirs.extend(dropins::application_order(ranked));
            }
        }

        dirs.iter().flat_map(|d| dropins::conf_files(d)).collect()
    }

    // ---- edges --------------------------------------------------------

    fn apply_dep_links(&mut self, ms: &mut MasterStruct) {
        let links = std::mem::take(&mut self.discovery.dep_links);
        for link in links {
            let Some(owner) = self.ensure_target(ms, &link.owner) else {
                continue;
            };
            let Some(target) = self.ensure_target(ms, &link.entry) else {
                continue;
            };
            ms.add_edge(
                &owner,
                link.kind,
                &target,
                Origin::Explicit(link.link_path.clone()),
                "Unit",
            );
        }
    }

    /// Extract `[Unit]` relation directives into edges, chasing template
    /// instances as they are synthesized.
    fn extract_relations(&mut self, ms: &mut MasterStruct) {
        let mut pending: Vec<String> = ms.units.keys().cloned().collect();
        let mut processed: BTreeSet<String> = BTreeSet::new();

        while let Some(name) = pending.pop() {
            if !processed.insert(name.clone()) {
                continue;
            }
            let Some(record) = ms.units.get(&name) else {
                continue;
            };
            if record.is_template || record.masked || record.not_found {
                continue;
            }

            let mut planned: Vec<(RelationKind, String, PathBuf)> = Vec::new();
            if let Some(section) = record.directives.get("Unit") {
                for (key, values) in section {
                    let Some(kind) = RelationKind::parse_directive(key) else {
                        continue;
                    };
                    for value in values {
                        for word in value.value.split_whitespace() {
                            planned.push((kind, word.to_string(), value.origin.clone()));
                        }
                    }
                }
            }

            for (kind, raw_target, origin) in planned {
                let Some(target) = self.ensure_target(ms, &raw_target) else {
                    if let Some(record) = ms.units.get_mut(&name) {
                        record.warn(format!("'{}' is not a valid unit name", raw_target));
                    }
                    continue;
                };
                ms.add_edge(&name, kind, &target, Origin::Explicit(origin), "Unit");
                if !processed.contains(&target) {
                    pending.push(target);
                }
            }
        }
    }

    /// Resolve a referenced name to a canonical key, creating a template
    /// instance or a synthetic `not_found` record when necessary. Returns
    /// `None` for names that cannot name a unit.
    fn ensure_target(&mut self, ms: &mut MasterStruct, raw: &str) -> Option<String> {
        if ms.units.contains_key(raw) {
            return Some(raw.to_string());
        }
        if let Some(canonical) = self.alias_index.get(raw) {
            return Some(canonical.clone());
        }

        let parsed = UnitName::parse(raw)?;
        if parsed.is_instance() {
            if let Some(template_key) = parsed.template_name() {
                if ms.units.contains_key(&template_key) {
                    let record = self.instantiate(ms, &parsed, &template_key);
                    ms.units.insert(parsed.full_name(), record);
                    return Some(parsed.full_name());
                }
            }
        }

        ms.ensure_unit(raw)?;
        Some(raw.to_string())
    }

    /// Synthesize a template instance: copy the template's merged
    /// directives, overlay instance-named drop-ins, then substitute
    /// specifiers.
    fn instantiate(
        &self,
        ms: &MasterStruct,
        name: &UnitName,
        template_key: &str,
    ) -> UnitRecord {
        log::debug!("instantiating {} from {}", name, template_key);
        let template = &ms.units[template_key];

        let mut record = UnitRecord::new(name);
        record.source_path = template.source_path.clone();
        record.directives = template.directives.clone();
        record.dropins = template.dropins.clone();

        if let Some(ranked) = self.discovery.dropin_dirs.get(&name.full_name()) {
            for dir in dropins::application_order(ranked) {
                for conf in dropins::conf_files(&dir) {
                    let parsed = match fs::read_to_string(&conf) {
                        Ok(content) => parse_file(&content),
                        Err(e) => Err(e.into()),
                    };
                    match parsed {
                        Ok(directives) => {
                            dropins::apply_directives(&mut record.directives, &directives, &conf);
                            record.dropins.push(conf);
                        }
                        Err(e) => record.warn(format!(
                            "MalformedUnit in drop-in {}: {}",
                            conf.display(),
                            e
                        )),
                    }
                }
            }
        }

        expand_record(&mut record, name);
        record
    }

    // ---- enrichment ---------------------------------------------------

    fn enrich_commands(&self, ms: &mut MasterStruct) {
        let names: Vec<String> = ms.units.keys().cloned().collect();
        for name in names {
            let Some(record) = ms.units.get(&name) else {
                continue;
            };
            if record.is_template || record.masked || record.not_found {
                continue;
            }

            let mut commands = Vec::new();
            for section in record.directives.values() {
                for directive in COMMAND_DIRECTIVES {
                    let Some(values) = section.get(*directive) else {
                        continue;
                    };
                    for value in values {
                        let mut command = CommandRecord {
                            directive: directive.to_string(),
                            command: value.value.clone(),
                            ..Default::default()
                        };
                        if let Some(executable) = enrich::command_executable(&value.value) {
                            if let Some(located) =
                                enrich::locate_under_root(&self.root, &executable)
                            {
                                if let Some(hook) = &self.enricher {
                                    let enrichment = hook.enrich(&located);
                                    command.libraries = enrichment.libraries;
                                    command.strings = enrichment.strings;
                                    command.file_hash = enrichment.file_hash;
                                }
                            }
                            command.executable = Some(executable);
                        }
                        commands.push(command);
                    }
                }
            }

            if let Some(record) = ms.units.get_mut(&name) {
                record.exec_commands = commands;
            }
        }
    }
}

/// Flag unrecognized keys in the fixed-vocabulary sections. Type-specific
/// sections stay open for forward compatibility with new systemd keys.
fn warn_unknown_directives(record: &mut UnitRecord) {
    let mut unknown = Vec::new();
    if let Some(section) = record.directives.get("Unit") {
        for key in section.keys() {
            if !crate::units::known::known_unit_key(key) {
                unknown.push(format!("UnknownDirective: {} in [Unit]", key));
            }
        }
    }
    if let Some(section) = record.directives.get("Install") {
        for key in section.keys() {
            if !crate::units::known::known_install_key(key) {
                unknown.push(format!("UnknownDirective: {} in [Install]", key));
            }
        }
    }
    for message in unknown {
        record.warn(message);
    }
}

/// Substitute specifiers in every directive value of an instance record.
fn expand_record(record: &mut UnitRecord, name: &UnitName) {
    let mut unknown: BTreeSet<String> = BTreeSet::new();
    for section in record.directives.values_mut() {
        for values in section.values_mut() {
            for value in values {
                let (expanded, unrecognized) = expand_specifiers(&value.value, name);
                value.value = expanded;
                unknown.extend(unrecognized);
            }
        }
    }
    for specifier in unknown {
        record.warn(format!("UnknownSpecifier: {}", specifier));
    }
}

/// Aliasing may not cross type or template/instance class boundaries.
fn alias_compatible(link: &UnitName, target: &UnitName) -> bool {
    link.unit_type == target.unit_type
        && link.is_template() == target.is_template()
        && link.is_instance() == target.is_instance()
}

enum ResolvedLink {
    File { path: PathBuf },
    Masked,
    Dangling { intended: Option<String> },
    Escaping { intended: Option<String> },
}

/// Chase a symlink, confined to `root`: absolute targets are reinterpreted
/// as root-relative, and any hop that lexically escapes the root makes the
/// link dangling-by-policy. `/dev/null` targets mean masking.
fn resolve_link(root: &Path, link: &Path) -> ResolvedLink {
    let mut current = link.to_path_buf();
    let mut intended = None;

    for _ in 0..16 {
        let target = match fs::read_link(&current) {
            Ok(target) => target,
            Err(_) => return ResolvedLink::Dangling { intended },
        };
        if target == Path::new("/dev/null") {
            return ResolvedLink::Masked;
        }
        intended = target
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);

        let joined = if target.is_absolute() {
            root.join(target.strip_prefix("/").unwrap_or(&target))
        } else {
            current
                .parent()
                .unwrap_or_else(|| Path::new("/"))
                .join(&target)
        };
        let normalized = normalize_path(&joined);
        if !normalized.starts_with(root) {
            return ResolvedLink::Escaping { intended };
        }

        match fs::symlink_metadata(&normalized) {
            Ok(meta) if meta.file_type().is_symlink() => current = normalized,
            Ok(meta) if meta.is_file() => return ResolvedLink::File { path: normalized },
            _ => return ResolvedLink::Dangling { intended },
        }
    }

    // Link chain too deep; treat as dangling.
    ResolvedLink::Dangling { intended }
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_path(Path::new("/a/../../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_alias_compatible() {
        let plain = UnitName::parse("a.service").unwrap();
        let other_plain = UnitName::parse("b.service").unwrap();
        let target_unit = UnitName::parse("a.target").unwrap();
        let template = UnitName::parse("a@.service").unwrap();
        let instance = UnitName::parse("a@x.service").unwrap();

        assert!(alias_compatible(&plain, &other_plain));
        assert!(alias_compatible(&template, &template));
        assert!(alias_compatible(&instance, &instance));
        assert!(!alias_compatible(&plain, &target_unit));
        assert!(!alias_compatible(&plain, &template));
        assert!(!alias_compatible(&instance, &template));
    }

    #[test]
    fn test_resolve_link_confinement() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("etc/systemd/system")).unwrap();
        std::fs::create_dir_all(root.join("usr/lib/systemd/system")).unwrap();
        std::fs::write(root.join("usr/lib/systemd/system/foo.service"), "[Unit]\n").unwrap();

        // absolute target, reinterpreted under the root
        let link = root.join("etc/systemd/system/default.service");
        std::os::unix::fs::symlink("/usr/lib/systemd/system/foo.service", &link).unwrap();
        assert!(matches!(
            resolve_link(root, &link),
            ResolvedLink::File { path } if path == root.join("usr/lib/systemd/system/foo.service")
        ));

        // relative target
        let rel = root.join("usr/lib/systemd/system/bar.service");
        std::os::unix::fs::symlink("foo.service", &rel).unwrap();
        assert!(matches!(resolve_link(root, &rel), ResolvedLink::File { .. }));

        // escaping target
        let esc = root.join("etc/systemd/system/esc.service");
        std::os::unix::fs::symlink("../../../../../../etc/passwd", &esc).unwrap();
        assert!(matches!(
            resolve_link(root, &esc),
            ResolvedLink::Escaping { .. }
        ));

        // dangling target
        let dangling = root.join("etc/systemd/system/gone.service");
        std::os::unix::fs::symlink("/usr/lib/systemd/system/gone.service", &dangling).unwrap();
        assert!(matches!(
            resolve_link(root, &dangling),
            ResolvedLink::Dangling { intended: Some(name) } if name == "gone.service"
        ));

        // masked
        let masked = root.join("etc/systemd/system/off.service");
        std::os::unix::fs::symlink("/dev/null", &masked).unwrap();
        assert!(matches!(resolve_link(root, &masked), ResolvedLink::Masked));
    }
}
