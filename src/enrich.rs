//! Artifact enricher hook
//!
//! For every `Exec*` command line the snapshot builder resolves the
//! executable under the filesystem root and offers it to an optional
//! enricher, which may attach libraries, interesting strings and a file
//! hash to the command record. The core never runs the binary; without a
//! hook the enrichment stays empty.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Directives whose values are command lines subject to enrichment.
pub const COMMAND_DIRECTIVES: &[&str] = &[
    "ExecStart",
    "ExecStartPre",
    "ExecStartPost",
    "ExecCondition",
    "ExecReload",
    "ExecStop",
    "ExecStopPost",
];

/// Data an enricher may attach to a command record.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub libraries: BTreeSet<String>,
    pub strings: BTreeSet<String>,
    pub file_hash: Option<String>,
}

/// Binary inspection hook. Implementations receive the executable path as
/// it exists under the snapshot root and return whatever they extracted.
pub trait ArtifactEnricher {
    fn enrich(&self, executable: &Path) -> Enrichment;
}

/// Strip the execution-modifier prefixes systemd allows in front of a
/// command path: `@`, `-`, `:`, and one of `+`/`!`/`!!`, in any order.
pub fn strip_exec_prefixes(word: &str) -> &str {
    word.trim_start_matches(|c| matches!(c, '@' | '-' | ':' | '+' | '!'))
}

/// The executable path of a command line, prefixes removed. Returns `None`
/// for empty lines or unparseable quoting.
pub fn command_executable(command: &str) -> Option<String> {
    let words = shlex::split(command)?;
    let first = words.first()?;
    let binary = strip_exec_prefixes(first);
    if binary.is_empty() {
        None
    } else {
        Some(binary.to_string())
    }
}

/// Locate `executable` under the snapshot root. Only absolute paths can be
/// located; `$PATH` lookup is meaningless against an offline tree.
pub fn locate_under_root(root: &Path, executable: &str) -> Option<PathBuf> {
    let relative = executable.strip_prefix('/')?;
    let candidate = root.join(relative);
    if candidate.is_file() {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_exec_prefixes() {
        assert_eq!(strip_exec_prefixes("/bin/true"), "/bin/true");
        assert_eq!(strip_exec_prefixes("-/bin/true"), "/bin/true");
        assert_eq!(strip_exec_prefixes("@-/bin/true"), "/bin/true");
        assert_eq!(strip_exec_prefixes("!!/bin/true"), "/bin/true");
        assert_eq!(strip_exec_prefixes("+:/bin/true"), "/bin/true");
    }

    #[test]
    fn test_command_executable() {
        assert_eq!(
            command_executable("/usr/bin/daemon --flag value").unwrap(),
            "/usr/bin/daemon"
        );
        assert_eq!(
            command_executable("-/usr/bin/kill -s HUP $MAINPID").unwrap(),
            "/usr/bin/kill"
        );
        assert_eq!(command_executable(""), None);
    }

    #[test]
    fn test_command_executable_quoted() {
        assert_eq!(
            command_executable("'/opt/my app/run' --verbose").unwrap(),
            "/opt/my app/run"
        );
    }

    #[test]
    fn test_locate_under_root() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("usr/bin")).unwrap();
        std::fs::write(tmp.path().join("usr/bin/daemon"), b"\x7fELF").unwrap();

        assert_eq!(
            locate_under_root(tmp.path(), "/usr/bin/daemon").unwrap(),
            tmp.path().join("usr/bin/daemon")
        );
        assert_eq!(locate_under_root(tmp.path(), "/usr/bin/missing"), None);
        assert_eq!(locate_under_root(tmp.path(), "relative/path"), None);
    }
}
