//! Drop-in merging
//!
//! Layers `.conf` fragments over a unit's primary file. Application order,
//! low precedence first so later files override:
//!
//! 1. type-wide drop-ins (`<type>.d/`) across search paths,
//! 2. name-specific drop-ins (`<unit>.d/`),
//! 3. drop-ins named after each alias of the unit (`<alias>.d/`).
//!
//! Within each directory files merge in lexicographic filename order. A
//! directive appends to the accumulated value list; an empty `Key=` clears
//! the list for that key.

use std::path::{Path, PathBuf};

use crate::master::{DirectiveMap, DirectiveValue};
use crate::units::Directive;

/// A drop-in directory together with the precedence rank of the search path
/// it was found in (0 = highest precedence, i.e. `/etc`).
#[derive(Debug, Clone)]
pub struct RankedDir {
    pub precedence: usize,
    pub path: PathBuf,
}

/// Apply parsed directives from one file onto the accumulated map.
/// An empty value resets the key: everything merged earlier is dropped and
/// only values from later files survive.
pub fn apply_directives(map: &mut DirectiveMap, parsed: &[Directive], origin: &Path) {
    for directive in parsed {
        let section = map.entry(directive.section.clone()).or_default();
        if directive.value.is_empty() {
            section.insert(directive.key.clone(), Vec::new());
        } else {
            section
                .entry(directive.key.clone())
                .or_default()
                .push(DirectiveValue {
                    value: directive.value.clone(),
                    origin: origin.to_path_buf(),
                });
        }
    }
}

/// Order drop-in directories for application: lowest-precedence search path
/// first, so `/etc` fragments land last and win.
pub fn application_order(dirs: &[RankedDir]) -> Vec<PathBuf> {
    let mut sorted: Vec<&RankedDir> = dirs.iter().collect();
    sorted.sort_by(|a, b| b.precedence.cmp(&a.precedence).then(a.path.cmp(&b.path)));
    sorted.into_iter().map(|d| d.path.clone()).collect()
}

/// The `.conf` files of one drop-in directory, lexicographically sorted.
pub fn conf_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        log::warn!("cannot read drop-in directory {}", dir.display());
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(false, |e| e == "conf") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    files
}
