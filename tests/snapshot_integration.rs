//! Integration tests for the snapshot builder
//!
//! Each test assembles a synthetic unit tree in a temporary directory and
//! checks the master structure built from it.

use std::path::Path;

use sysd_snapshot::{
    ArtifactEnricher, Enrichment, MasterStruct, Origin, RelationKind, SnapshotBuilder,
};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn symlink(root: &Path, rel: &str, target: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::os::unix::fs::symlink(target, path).unwrap();
}

async fn snapshot(root: &Path) -> MasterStruct {
    SnapshotBuilder::new(root).build().await.unwrap()
}

fn has_relation(ms: &MasterStruct, unit: &str, kind: RelationKind, target: &str) -> bool {
    ms.units[unit]
        .relations
        .iter()
        .any(|r| r.kind == kind && r.target == target)
}

#[tokio::test]
async fn test_alias_and_dropin_override() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "usr/lib/systemd/system/foo.service",
        "[Unit]\nDescription=orig\n\n[Service]\nExecStart=/bin/a\n",
    );
    write(
        root,
        "etc/systemd/system/foo.service.d/10-over.conf",
        "[Service]\nExecStart=\nExecStart=/bin/b\n",
    );
    symlink(
        root,
        "etc/systemd/system/default.target",
        "/usr/lib/systemd/system/foo.service",
    );

    let ms = snapshot(root).await;

    let foo = &ms.units["foo.service"];
    assert_eq!(foo.directive_values("Service", "ExecStart"), vec!["/bin/b"]);
    assert_eq!(
        foo.dropins,
        vec![root.join("etc/systemd/system/foo.service.d/10-over.conf")]
    );
    assert!(foo
        .aliases
        .contains(&root.join("etc/systemd/system/default.target").display().to_string()));
    // the alias is not a unit of its own
    assert!(!ms.units.contains_key("default.target"));
    assert_eq!(ms.resolve_name("default.target"), Some("foo.service"));

    assert!(ms.verify().is_empty(), "{:?}", ms.verify());
}

#[tokio::test]
async fn test_template_instantiation() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "usr/lib/systemd/system/getty@.service",
        "[Unit]\nDescription=Getty on %I\n\n[Service]\nExecStart=/sbin/agetty %i\n",
    );
    symlink(
        root,
        "etc/systemd/system/getty.target.wants/getty@tty1.service",
        "/usr/lib/systemd/system/getty@.service",
    );

    let ms = snapshot(root).await;

    assert!(ms.units["getty@.service"].is_template);

    let instance = &ms.units["getty@tty1.service"];
    assert!(!instance.is_template);
    assert_eq!(instance.instance_name.as_deref(), Some("tty1"));
    assert_eq!(
        instance.source_path.as_deref(),
        Some(root.join("usr/lib/systemd/system/getty@.service").as_path())
    );
    assert_eq!(
        instance.directive_values("Service", "ExecStart"),
        vec!["/sbin/agetty tty1"]
    );
    assert_eq!(
        instance.directive_values("Unit", "Description"),
        vec!["Getty on tty1"]
    );

    assert!(has_relation(&ms, "getty.target", RelationKind::Wants, "getty@tty1.service"));
    assert!(has_relation(&ms, "getty@tty1.service", RelationKind::WantedBy, "getty.target"));
}

#[tokio::test]
async fn test_masked_unit_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    symlink(root, "etc/systemd/system/bluetooth.service", "/dev/null");

    let ms = snapshot(root).await;

    let unit = &ms.units["bluetooth.service"];
    assert!(unit.masked);
    assert!(unit.directives.is_empty());
    assert!(unit.relations.is_empty());
}

#[tokio::test]
async fn test_masking_wins_over_lower_precedence_file() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    symlink(root, "etc/systemd/system/noisy.service", "/dev/null");
    write(
        root,
        "usr/lib/systemd/system/noisy.service",
        "[Service]\nExecStart=/bin/noise\n",
    );

    let ms = snapshot(root).await;

    let unit = &ms.units["noisy.service"];
    assert!(unit.masked);
    assert_eq!(
        unit.overridden_by,
        vec![root.join("usr/lib/systemd/system/noisy.service")]
    );
}

#[tokio::test]
async fn test_service_default_dependencies_injected() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "usr/lib/systemd/system/sshd.service",
        "[Unit]\nDescription=OpenSSH server\n\n[Service]\nExecStart=/usr/sbin/sshd -D\n",
    );

    let ms = snapshot(root).await;

    let sshd = &ms.units["sshd.service"];
    let implicit = Origin::implicit("service-default");
    for (kind, target) in [
        (RelationKind::Requires, "sysinit.target"),
        (RelationKind::After, "sysinit.target"),
        (RelationKind::After, "basic.target"),
        (RelationKind::Conflicts, "shutdown.target"),
        (RelationKind::Before, "shutdown.target"),
    ] {
        assert!(
            sshd.relations
                .iter()
                .any(|r| r.kind == kind && r.target == target && r.origin == implicit),
            "missing {:?} {}",
            kind,
            target
        );
    }

    // referenced targets exist as synthetic records
    assert!(ms.units["sysinit.target"].not_found);
    assert!(ms.units["shutdown.target"].not_found);
    assert!(ms.verify().is_empty(), "{:?}", ms.verify());
}

#[tokio::test]
async fn test_nested_mount_requires_parent() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "usr/lib/systemd/system/var.mount",
        "[Mount]\nWhat=/dev/sda2\nWhere=/var\n",
    );
    write(
        root,
        "usr/lib/systemd/system/var-log.mount",
        "[Mount]\nWhat=/dev/sda3\nWhere=/var/log\n",
    );

    let ms = snapshot(root).await;

    for kind in [RelationKind::Requires, RelationKind::After] {
        assert!(has_relation(&ms, "var-log.mount", kind, "var.mount"));
    }
    assert!(has_relation(&ms, "var.mount", RelationKind::RequiredBy, "var-log.mount"));
    // backing devices are bound
    assert!(has_relation(&ms, "var.mount", RelationKind::BindsTo, "dev-sda2.device"));
}

#[tokio::test]
async fn test_first_wins_precedence() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "etc/systemd/system/foo.service",
        "[Unit]\nDescription=from etc\n\n[Service]\nExecStart=/bin/etc\n",
    );
    write(
        root,
        "usr/lib/systemd/system/foo.service",
        "[Unit]\nDescription=from lib\n\n[Service]\nExecStart=/bin/lib\n",
    );

    let ms = snapshot(root).await;

    let foo = &ms.units["foo.service"];
    assert_eq!(
        foo.source_path.as_deref(),
        Some(root.join("etc/systemd/system/foo.service").as_path())
    );
    assert_eq!(
        foo.overridden_by,
        vec![root.join("usr/lib/systemd/system/foo.service")]
    );
    assert_eq!(foo.directive_values("Unit", "Description"), vec!["from etc"]);
}

#[tokio::test]
async fn test_wants_and_requires_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "usr/lib/systemd/system/multi-user.target", "[Unit]\n");
    write(
        root,
        "usr/lib/systemd/system/a.service",
        "[Service]\nExecStart=/bin/a\n",
    );
    write(
        root,
        "usr/lib/systemd/system/b.service",
        "[Service]\nExecStart=/bin/b\n",
    );
    symlink(
        root,
        "etc/systemd/system/multi-user.target.wants/a.service",
        "/usr/lib/systemd/system/a.service",
    );
    symlink(
        root,
        "etc/systemd/system/multi-user.target.requires/b.service",
        "/usr/lib/systemd/system/b.service",
    );

    let ms = snapshot(root).await;

    assert!(has_relation(&ms, "multi-user.target", RelationKind::Wants, "a.service"));
    assert!(has_relation(&ms, "multi-user.target", RelationKind::Requires, "b.service"));
    assert!(has_relation(&ms, "a.service", RelationKind::WantedBy, "multi-user.target"));
    assert!(has_relation(&ms, "b.service", RelationKind::RequiredBy, "multi-user.target"));

    // target units order themselves after their requirement dependencies
    assert!(has_relation(&ms, "multi-user.target", RelationKind::After, "a.service"));
}

#[tokio::test]
async fn test_typewide_dropins_layer_before_name_specific() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "usr/lib/systemd/system/app.service",
        "[Service]\nExecStart=/bin/app\n",
    );
    write(
        root,
        "usr/lib/systemd/system/service.d/10-global.conf",
        "[Service]\nTimeoutStopSec=10\n",
    );
    write(
        root,
        "etc/systemd/system/app.service.d/20-local.conf",
        "[Service]\nTimeoutStopSec=\nTimeoutStopSec=30\n",
    );

    let ms = snapshot(root).await;

    let app = &ms.units["app.service"];
    assert_eq!(
        app.dropins,
        vec![
            root.join("usr/lib/systemd/system/service.d/10-global.conf"),
            root.join("etc/systemd/system/app.service.d/20-local.conf"),
        ]
    );
    // name-specific reset dropped the type-wide value
    assert_eq!(app.directive_values("Service", "TimeoutStopSec"), vec!["30"]);
}

#[tokio::test]
async fn test_on_disk_instance_expands_specifiers() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "etc/systemd/system/backup@daily.service",
        "[Service]\nExecStart=/usr/bin/backup --profile %i --unit %n\n",
    );

    let ms = snapshot(root).await;

    assert_eq!(
        ms.units["backup@daily.service"].directive_values("Service", "ExecStart"),
        vec!["/usr/bin/backup --profile daily --unit backup@daily.service"]
    );
}

#[tokio::test]
async fn test_dangling_symlink_becomes_synthetic() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    symlink(
        root,
        "etc/systemd/system/ghost.service",
        "/usr/lib/systemd/system/gone.service",
    );

    let ms = snapshot(root).await;

    let gone = &ms.units["gone.service"];
    assert!(gone.not_found);
    assert!(gone
        .aliases
        .contains(&root.join("etc/systemd/system/ghost.service").display().to_string()));
    assert!(gone.warnings.iter().any(|w| w.starts_with("DanglingSymlink")));
}

#[tokio::test]
async fn test_escaping_symlink_treated_as_dangling() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    symlink(
        root,
        "etc/systemd/system/esc.service",
        "/../outside/esc.service",
    );

    let ms = snapshot(root).await;

    let esc = &ms.units["esc.service"];
    assert!(esc.not_found);
    assert!(esc.warnings.iter().any(|w| w.starts_with("EscapingSymlink")));
}

#[tokio::test]
async fn test_bad_alias_dropped() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "usr/lib/systemd/system/real.service", "[Service]\nExecStart=/bin/x\n");
    // type suffix change is not a legal alias
    symlink(
        root,
        "etc/systemd/system/real.target",
        "/usr/lib/systemd/system/real.service",
    );

    let ms = snapshot(root).await;

    assert!(ms.units["real.service"].aliases.is_empty());
    assert!(ms.meta.warnings.iter().any(|w| w.starts_with("BadAlias")));
}

#[tokio::test]
async fn test_unknown_directives_preserved_and_flagged() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "usr/lib/systemd/system/odd.service",
        "[Unit]\nFrobnicate=1\nConditionPathExists=/etc/odd\n\n[Service]\nExecStart=/bin/odd\nNewFangledKey=yes\n",
    );

    let ms = snapshot(root).await;

    let odd = &ms.units["odd.service"];
    // preserved verbatim
    assert_eq!(odd.directive_values("Unit", "Frobnicate"), vec!["1"]);
    assert_eq!(odd.directive_values("Service", "NewFangledKey"), vec!["yes"]);
    // only the fixed-vocabulary section is flagged
    assert!(odd
        .warnings
        .iter()
        .any(|w| w.contains("Frobnicate")));
    assert!(!odd.warnings.iter().any(|w| w.contains("ConditionPathExists")));
    assert!(!odd.warnings.iter().any(|w| w.contains("NewFangledKey")));
}

#[tokio::test]
async fn test_conditions_recorded_verbatim() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "usr/lib/systemd/system/cond.service",
        "[Unit]\nConditionPathExists=/nonexistent/on/this/host\nAssertKernelCommandLine=quiet\n\n[Service]\nExecStart=/bin/c\n",
    );

    let ms = snapshot(root).await;

    let cond = &ms.units["cond.service"];
    assert_eq!(
        cond.directive_values("Unit", "ConditionPathExists"),
        vec!["/nonexistent/on/this/host"]
    );
    assert_eq!(
        cond.directive_values("Unit", "AssertKernelCommandLine"),
        vec!["quiet"]
    );
}

struct StubEnricher;

impl ArtifactEnricher for StubEnricher {
    fn enrich(&self, _executable: &Path) -> Enrichment {
        let mut enrichment = Enrichment::default();
        enrichment.libraries.insert("libc.so.6".to_string());
        enrichment.strings.insert("/etc/daemon.conf".to_string());
        enrichment.file_hash = Some("deadbeef".to_string());
        enrichment
    }
}

#[tokio::test]
async fn test_enricher_hook_attaches_to_commands() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "usr/bin/daemon", "\x7fELF");
    write(
        root,
        "usr/lib/systemd/system/daemon.service",
        "[Service]\nExecStart=/usr/bin/daemon --serve\nExecReload=-/usr/bin/missing reload\n",
    );

    let ms = SnapshotBuilder::new(root)
        .with_enricher(Box::new(StubEnricher))
        .build()
        .await
        .unwrap();

    let commands = &ms.units["daemon.service"].exec_commands;
    let start = commands.iter().find(|c| c.directive == "ExecStart").unwrap();
    assert_eq!(start.executable.as_deref(), Some("/usr/bin/daemon"));
    assert!(start.libraries.contains("libc.so.6"));
    assert_eq!(start.file_hash.as_deref(), Some("deadbeef"));

    // unlocatable executables get no enrichment but are still recorded
    let reload = commands.iter().find(|c| c.directive == "ExecReload").unwrap();
    assert_eq!(reload.executable.as_deref(), Some("/usr/bin/missing"));
    assert!(reload.libraries.is_empty());
    assert_eq!(reload.file_hash, None);
}

#[tokio::test]
async fn test_without_enricher_commands_still_recorded() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(root, "usr/bin/daemon", "\x7fELF");
    write(
        root,
        "usr/lib/systemd/system/daemon.service",
        "[Service]\nExecStart=/usr/bin/daemon\n",
    );

    let ms = snapshot(root).await;

    let commands = &ms.units["daemon.service"].exec_commands;
    assert_eq!(commands.len(), 1);
    assert!(commands[0].libraries.is_empty());
    assert_eq!(commands[0].file_hash, None);
}

#[tokio::test]
async fn test_generator_limitation_noted() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    std::fs::create_dir_all(root.join("etc/systemd/system")).unwrap();

    let ms = snapshot(root).await;
    assert!(ms.meta.warnings.iter().any(|w| w.contains("generator")));
}

#[tokio::test]
async fn test_master_struct_round_trip_is_byte_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "usr/lib/systemd/system/a.service",
        "[Unit]\nWants=b.service\nAfter=b.service\n\n[Service]\nExecStart=/bin/a\n",
    );
    write(root, "usr/lib/systemd/system/b.service", "[Service]\nExecStart=/bin/b\n");

    let ms = snapshot(root).await;

    let first = serde_json::to_string_pretty(&ms).unwrap();
    let reloaded: MasterStruct = serde_json::from_str(&first).unwrap();
    let second = serde_json::to_string_pretty(&reloaded).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_inaccessible_root_is_fatal() {
    let err = SnapshotBuilder::new("/definitely/not/a/real/root")
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, sysd_snapshot::SnapshotError::RootInaccessible(_)));
}
