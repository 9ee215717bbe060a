//! Implicit and default dependency injection
//!
//! After parsing and merging, every unit gains the edges systemd would add
//! on its own: default dependencies gated by `DefaultDependencies=` and
//! type-specific implicit edges (socket/service linkage, nested mounts,
//! slice hierarchy, ...). Rules only plan edges here; the snapshot builder
//! applies them so missing targets are synthesized in one place. Every
//! planned edge carries its rule id as origin (`implicit:<rule>`).

use crate::master::{MasterStruct, RelationKind, UnitRecord};
use crate::units::{
    device_name_from_interface, device_name_from_path, mount_path_from_name, slice_parent,
    unescape_path, UnitType,
};

/// An edge the injector wants added to the master structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdge {
    pub source: String,
    pub kind: RelationKind,
    pub target: String,
    pub rule: &'static str,
}

/// Filesystem types that make a mount a network mount.
const NETWORK_FS_TYPES: &[&str] = &[
    "nfs", "nfs4", "cifs", "smb3", "smbfs", "sshfs", "ceph", "glusterfs", "davfs", "9p", "afs",
    "fuse.sshfs",
];

/// Plan the implicit edges for every real unit in the master structure.
/// Templates, masked units and synthetic placeholders are generators or
/// dead weight and receive nothing.
pub fn plan(ms: &MasterStruct) -> Vec<PlannedEdge> {
    let mut edges = Vec::new();

    for (name, record) in &ms.units {
        if record.is_template || record.not_found || record.masked {
            continue;
        }
        let default_deps = record.directive_bool("Unit", "DefaultDependencies", true);

        match record.unit_type {
            UnitType::Service => service_rules(name, record, default_deps, &mut edges),
            UnitType::Socket => socket_rules(ms, name, record, default_deps, &mut edges),
            UnitType::Mount => mount_rules(ms, name, record, default_deps, &mut edges),
            UnitType::Automount => automount_rules(ms, name, record, default_deps, &mut edges),
            UnitType::Swap => swap_rules(ms, name, record, default_deps, &mut edges),
            UnitType::Target => target_rules(name, record, default_deps, &mut edges),
            UnitType::Path => path_rules(ms, name, record, default_deps, &mut edges),
            UnitType::Timer => timer_rules(name, record, default_deps, &mut edges),
            UnitType::Slice => slice_rules(name, default_deps, &mut edges),
            UnitType::Scope => scope_rules(name, default_deps, &mut edges),
            UnitType::Device => {}
        }

        common_rules(ms, name, record, &mut edges);
    }

    edges
}

fn push(edges: &mut Vec<PlannedEdge>, source: &str, kind: RelationKind, target: String, rule: &'static str) {
    edges.push(PlannedEdge {
        source: source.to_string(),
        kind,
        target,
        rule,
    });
}

fn shutdown_pair(edges: &mut Vec<PlannedEdge>, source: &str, rule: &'static str) {
    push(edges, source, RelationKind::Conflicts, "shutdown.target".into(), rule);
    push(edges, source, RelationKind::Before, "shutdown.target".into(), rule);
}

fn sysinit_pair(edges: &mut Vec<PlannedEdge>, source: &str, rule: &'static str) {
    push(edges, source, RelationKind::Requires, "sysinit.target".into(), rule);
    push(edges, source, RelationKind::After, "sysinit.target".into(), rule);
}

/// The unit this one triggers by name correspondence: same stem, different
/// type (`foo@bar.timer` -> `foo@bar.service`).
fn sibling_name(name: &str, record: &UnitRecord, suffix: &str) -> String {
    let stem = name
        .strip_suffix(&format!(".{}", record.unit_type))
        .unwrap_or(name);
    format!("{}.{}", stem, suffix)
}

fn service_rules(name: &str, record: &UnitRecord, default_deps: bool, edges: &mut Vec<PlannedEdge>) {
    if default_deps {
        sysinit_pair(edges, name, "service-default");
        push(edges, name, RelationKind::After, "basic.target".into(), "service-default");
        shutdown_pair(edges, name, "service-default");
    }

    if record.directive_last("Service", "Type") == Some("dbus") {
        push(edges, name, RelationKind::Requires, "dbus.socket".into(), "service-dbus");
        push(edges, name, RelationKind::After, "dbus.socket".into(), "service-dbus");
    }

    for (socket, _) in record.directive_list("Service", "Sockets") {
        push(edges, name, RelationKind::Wants, socket.clone(), "service-sockets");
        push(edges, name, RelationKind::After, socket, "service-sockets");
    }
    // The After= on activating sockets falls out of the socket's Before=
    // edge, whose inverse lands on the service.
}

fn socket_rules(
    ms: &MasterStruct,
    name: &str,
    record: &UnitRecord,
    default_deps: bool,
    edges: &mut Vec<PlannedEdge>,
) {
    if default_deps {
        push(edges, name, RelationKind::Before, "sockets.target".into(), "socket-default");
        sysinit_pair(edges, name, "socket-default");
        shutdown_pair(edges, name, "socket-default");
    }

    let service = record
        .directive_last("Socket", "Service")
        .map(str::to_string)
        .unwrap_or_else(|| sibling_name(name, record, "service"));
    push(edges, name, RelationKind::Before, service.clone(), "socket-service");
    push(edges, name, RelationKind::Triggers, service, "socket-service");

    for key in ["ListenStream", "ListenDatagram"] {
        for (address, _) in record.directive_list("Socket", key) {
            if !address.starts_with('/') {
                continue;
            }
            for mount in mounts_covering(ms, &address, name) {
                push(edges, name, RelationKind::Requires, mount.clone(), "socket-mounts");
                push(edges, name, RelationKind::After, mount, "socket-mounts");
            }
        }
    }

    if let Some(device) = record.directive_last("Socket", "BindToDevice") {
        if !device.is_empty() && device != "lo" {
            let device_unit = device_name_from_interface(device);
            push(edges, name, RelationKind::BindsTo, device_unit.clone(), "socket-bind-device");
            push(edges, name, RelationKind::After, device_unit, "socket-bind-device");
        }
    }
}

fn mount_rules(
    ms: &MasterStruct,
    name: &str,
    record: &UnitRecord,
    default_deps: bool,
    edges: &mut Vec<PlannedEdge>,
) {
    let where_path = mount_where(name, record);
    let nofail = has_nofail(record.directive_last("Mount", "Options"));
    let network = record
        .directive_last("Mount", "Type")
        .map_or(false, is_network_fs);

    if default_deps {
        push(edges, name, RelationKind::Before, "umount.target".into(), "mount-default");
        push(edges, name, RelationKind::Conflicts, "umount.target".into(), "mount-default");
        if network {
            for target in ["remote-fs-pre.target", "network.target", "network-online.target"] {
                push(edges, name, RelationKind::After, target.into(), "mount-network");
            }
            if !nofail {
                push(edges, name, RelationKind::Before, "remote-fs.target".into(), "mount-network");
            }
        } else {
            push(edges, name, RelationKind::After, "local-fs-pre.target".into(), "mount-default");
            if !nofail {
                push(edges, name, RelationKind::Before, "local-fs.target".into(), "mount-default");
            }
        }
    }

    if let Some(path) = &where_path {
        if let Some(parent) = nearest_parent_mount(ms, path, name) {
            push(edges, name, RelationKind::Requires, parent.clone(), "mount-parent");
            push(edges, name, RelationKind::After, parent, "mount-parent");
        }
    }

    if let Some(what) = record.directive_last("Mount", "What") {
        if what.starts_with("/dev/") {
            let device = device_name_from_path(what);
            push(edges, name, RelationKind::BindsTo, device.clone(), "mount-device");
            push(edges, name, RelationKind::After, device, "mount-device");
        }
    }
}

fn automount_rules(
    ms: &MasterStruct,
    name: &str,
    record: &UnitRecord,
    default_deps: bool,
    edges: &mut Vec<PlannedEdge>,
) {
    if default_deps {
        push(edges, name, RelationKind::Before, "umount.target".into(), "automount-default");
        push(edges, name, RelationKind::Conflicts, "umount.target".into(), "automount-default");
        push(edges, name, RelationKind::After, "local-fs-pre.target".into(), "automount-default");
        push(edges, name, RelationKind::Before, "local-fs.target".into(), "automount-default");
    }

    let mount = sibling_name(name, record, "mount");
    push(edges, name, RelationKind::Before, mount.clone(), "automount-mount");
    push(edges, name, RelationKind::Triggers, mount, "automount-mount");

    let where_path = record
        .directive_last("Automount", "Where")
        .map(str::to_string)
        .or_else(|| {
            name.strip_suffix(".automount")
                .map(unescape_path)
        });
    if let Some(path) = where_path {
        if let Some(parent) = nearest_parent_mount(ms, &path, name) {
            push(edges, name, RelationKind::Requires, parent.clone(), "automount-parent");
            push(edges, name, RelationKind::After, parent, "automount-parent");
        }
    }
}

fn swap_rules(
    ms: &MasterStruct,
    name: &str,
    record: &UnitRecord,
    default_deps: bool,
    edges: &mut Vec<PlannedEdge>,
) {
    if default_deps {
        push(edges, name, RelationKind::Conflicts, "umount.target".into(), "swap-default");
        push(edges, name, RelationKind::Before, "umount.target".into(), "swap-default");
        push(edges, name, RelationKind::Before, "swap.target".into(), "swap-default");
    }

    if let Some(what) = record.directive_last("Swap", "What") {
        if what.starts_with("/dev/") {
            let device = device_name_from_path(what);
            push(edges, name, RelationKind::BindsTo, device.clone(), "swap-device");
            push(edges, name, RelationKind::After, device, "swap-device");
        } else if what.starts_with('/') {
            for mount in mounts_covering(ms, what, name) {
                push(edges, name, RelationKind::BindsTo, mount.clone(), "swap-device");
                push(edges, name, RelationKind::After, mount, "swap-device");
            }
        }
    }
}

fn target_rules(name: &str, record: &UnitRecord, default_deps: bool, edges: &mut Vec<PlannedEdge>) {
    if default_deps {
        for relation in &record.relations {
            if matches!(relation.kind, RelationKind::Wants | RelationKind::Requires)
                && relation.target != name
            {
                push(
                    edges,
                    name,
                    RelationKind::After,
                    relation.target.clone(),
                    "target-dependencies",
                );
            }
        }
        shutdown_pair(edges, name, "target-default");
    }
}

fn path_rules(
    ms: &MasterStruct,
    name: &str,
    record: &UnitRecord,
    default_deps: bool,
    edges: &mut Vec<PlannedEdge>,
) {
    if default_deps {
        push(edges, name, RelationKind::Before, "paths.target".into(), "path-default");
        sysinit_pair(edges, name, "path-default");
        shutdown_pair(edges, name, "path-default");
    }

    let unit = record
        .directive_last("Path", "Unit")
        .map(str::to_string)
        .unwrap_or_else(|| sibling_name(name, record, "service"));
    push(edges, name, RelationKind::Before, unit.clone(), "path-unit");
    push(edges, name, RelationKind::Triggers, unit, "path-unit");

    for key in [
        "PathExists",
        "PathExistsGlob",
        "PathChanged",
        "PathModified",
        "DirectoryNotEmpty",
    ] {
        for (watched, _) in record.directive_list("Path", key) {
            if !watched.starts_with('/') {
                continue;
            }
            for mount in mounts_covering(ms, &watched, name) {
                push(edges, name, RelationKind::Requires, mount.clone(), "path-mounts");
                push(edges, name, RelationKind::After, mount, "path-mounts");
            }
        }
    }
}

fn timer_rules(name: &str, record: &UnitRecord, default_deps: bool, edges: &mut Vec<PlannedEdge>) {
    if default_deps {
        sysinit_pair(edges, name, "timer-default");
        push(edges, name, RelationKind::Before, "timers.target".into(), "timer-default");
        shutdown_pair(edges, name, "timer-default");
    }

    let unit = record
        .directive_last("Timer", "Unit")
        .map(str::to_string)
        .unwrap_or_else(|| sibling_name(name, record, "service"));
    push(edges, name, RelationKind::Before, unit.clone(), "timer-unit");
    push(edges, name, RelationKind::Triggers, unit, "timer-unit");

    if !record.directive_values("Timer", "OnCalendar").is_empty() {
        push(edges, name, RelationKind::After, "time-set.target".into(), "timer-calendar");
        push(edges, name, RelationKind::After, "time-sync.target".into(), "timer-calendar");
    }
}

fn slice_rules(name: &str, default_deps: bool, edges: &mut Vec<PlannedEdge>) {
    if default_deps {
        shutdown_pair(edges, name, "slice-default");
    }
    if let Some(parent) = slice_parent(name) {
        push(edges, name, RelationKind::Requires, parent.clone(), "slice-parent");
        push(edges, name, RelationKind::After, parent, "slice-parent");
    }
}

fn scope_rules(name: &str, default_deps: bool, edges: &mut Vec<PlannedEdge>) {
    if default_deps {
        shutdown_pair(edges, name, "scope-default");
    }
}

/// Rules that apply regardless of unit type.
fn common_rules(ms: &MasterStruct, name: &str, record: &UnitRecord, edges: &mut Vec<PlannedEdge>) {
    for (path, _) in record.directive_list("Unit", "RequiresMountsFor") {
        if !path.starts_with('/') {
            continue;
        }
        for mount in mounts_covering(ms, &path, name) {
            push(edges, name, RelationKind::Requires, mount.clone(), "requires-mounts-for");
            push(edges, name, RelationKind::After, mount, "requires-mounts-for");
        }
    }

    if let Some(slice) = directive_any_section(record, "Slice") {
        push(edges, name, RelationKind::Requires, slice.to_string(), "slice-of");
        push(edges, name, RelationKind::After, slice.to_string(), "slice-of");
    }

    if directive_any_section(record, "TTYPath").is_some() {
        push(
            edges,
            name,
            RelationKind::After,
            "systemd-vconsole-setup.service".into(),
            "tty-console",
        );
    }

    if let Some(namespace) = directive_any_section(record, "LogNamespace") {
        let journald = format!("systemd-journald@{}.service", namespace);
        push(edges, name, RelationKind::Requires, journald.clone(), "log-namespace");
        push(edges, name, RelationKind::After, journald, "log-namespace");
    }
}

/// Last value of `key` in whichever section declares it.
fn directive_any_section<'a>(record: &'a UnitRecord, key: &str) -> Option<&'a str> {
    record
        .directives
        .keys()
        .filter_map(|section| record.directive_last(section, key))
        .last()
}

fn has_nofail(options: Option<&str>) -> bool {
    options.map_or(false, |o| o.split(',').any(|opt| opt.trim() == "nofail"))
}

fn is_network_fs(fs_type: &str) -> bool {
    NETWORK_FS_TYPES.contains(&fs_type)
}

/// The mount point a mount unit controls: explicit `Where=`, else derived
/// from the unit name.
fn mount_where(name: &str, record: &UnitRecord) -> Option<String> {
    record
        .directive_last("Mount", "Where")
        .map(str::to_string)
        .or_else(|| mount_path_from_name(name))
}

/// Every mount unit in the master structure whose mount point is a prefix
/// of `path`. The root mount is skipped: it would cover everything.
pub fn mounts_covering(ms: &MasterStruct, path: &str, exclude: &str) -> Vec<String> {
    let mut covering = Vec::new();
    for (name, record) in &ms.units {
        if record.unit_type != UnitType::Mount || record.is_template || name == exclude {
            continue;
        }
        let Some(mount_path) = mount_where(name, record) else {
            continue;
        };
        if mount_path == "/" {
            continue;
        }
        if std::path::Path::new(path).starts_with(&mount_path) {
            covering.push(name.clone());
        }
    }
    covering
}

/// The deepest mount unit whose mount point is a proper ancestor of `path`.
fn nearest_parent_mount(ms: &MasterStruct, path: &str, exclude: &str) -> Option<String> {
    let mut ancestor = std::path::Path::new(path).parent();
    while let Some(dir) = ancestor {
        let dir_str = dir.to_str()?;
        if dir_str == "/" || dir_str.is_empty() {
            break;
        }
        for (name, record) in &ms.units {
            if record.unit_type != UnitType::Mount || record.is_template || name == exclude {
                continue;
            }
            if mount_where(name, record).as_deref() == Some(dir_str) {
                return Some(name.clone());
            }
        }
        ancestor = dir.parent();
    }
    None
}
