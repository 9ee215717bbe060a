//! Known directive vocabulary for the fixed sections
//!
//! `[Unit]` and `[Install]` have a closed set of keys; anything else there
//! is worth an UnknownDirective warning during analysis. Type-specific
//! sections ([Service], [Socket], ...) are left open so new systemd keys
//! pass through untouched.

/// Generic `[Unit]` options.
pub const UNIT_SECTION_KEYS: &[&str] = &[
    "Description",
    "Documentation",
    "Before",
    "After",
    "Wants",
    "Conflicts",
    "Requires",
    "Requisite",
    "BindsTo",
    "PartOf",
    "Upholds",
    "OnSuccess",
    "OnFailure",
    "PropagatesReloadTo",
    "ReloadPropagatedFrom",
    "PropagatesStopTo",
    "StopPropagatedFrom",
    "JoinsNamespaceOf",
    "RequiresMountsFor",
    "OnFailureJobMode",
    "IgnoreOnIsolate",
    "StopWhenUnneeded",
    "RefuseManualStart",
    "RefuseManualStop",
    "AllowIsolate",
    "DefaultDependencies",
    "CollectMode",
    "FailureAction",
    "FailureActionExitStatus",
    "SuccessAction",
    "SuccessActionExitStatus",
    "JobTimeoutSec",
    "JobRunningTimeoutSec",
    "JobTimeoutAction",
    "JobTimeoutRebootArgument",
    "StartLimitIntervalSec",
    "StartLimitInterval",
    "StartLimitBurst",
    "StartLimitAction",
    "RebootArgument",
    "SourcePath",
];

/// `[Install]` options.
pub const INSTALL_SECTION_KEYS: &[&str] = &[
    "Alias",
    "WantedBy",
    "RequiredBy",
    "UpheldBy",
    "Also",
    "DefaultInstance",
];

/// Condition and assertion prefixes; the suffix set keeps growing with
/// systemd releases, so match on the prefix and record the value verbatim.
pub const CONDITION_PREFIXES: &[&str] = &["Condition", "Assert"];

/// Whether a `[Unit]` key is part of the known vocabulary.
pub fn known_unit_key(key: &str) -> bool {
    UNIT_SECTION_KEYS.contains(&key)
        || CONDITION_PREFIXES
            .iter()
            .any(|prefix| key.starts_with(prefix))
}

/// Whether an `[Install]` key is part of the known vocabulary.
pub fn known_install_key(key: &str) -> bool {
    INSTALL_SECTION_KEYS.contains(&key)
}
