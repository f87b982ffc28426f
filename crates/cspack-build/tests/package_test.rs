use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use cspack_build::container::ContainerReader;
use cspack_build::manifest::{
    CLOUD_CONFIGURATION_FILE, LOCAL_CONFIGURATION_FILE, SERVICE_DEFINITION_FILE,
};
use cspack_build::package::{PACKAGE_MANIFEST_URI, role_part_uri};
use cspack_build::{
    ContainerError, ContentFilter, Error, PACKAGE_FIXED_PART_COUNT, PackageAssembler, PackagingError,
    ValidationError, create_package, write_manifests,
};
use cspack_core::{RoleDefinition, RoleKind, ServiceProject};
use tempfile::TempDir;

const SERVICE_NAME: &str = "TEST_SERVICE_NAME";
const PACKAGE_FILE: &str = "cloud_package.cspkg";

fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("content of {rel}")).unwrap();
}

/// Lay out a role tree the way the role scaffolding does, including a
/// runtime `logs/` directory.
fn scaffold_role(service_dir: &Path, name: &str) -> PathBuf {
    let root = service_dir.join(name);
    touch(&root, "server.js");
    touch(&root, "package.json");
    touch(&root, "Web.config");
    touch(&root, "bin/setup_web.cmd");
    touch(&root, "bin/node.cmd");
    touch(&root, "logs/0.txt");
    root
}

/// Create a service directory with `cspack.toml` and the given roles.
fn service(tmp: &TempDir, roles: &[(&str, &str, u32)]) -> PathBuf {
    let dir = tmp.path().join(SERVICE_NAME);
    std::fs::create_dir_all(&dir).unwrap();

    let mut toml = format!("[service]\nname = \"{SERVICE_NAME}\"\n");
    for (name, kind, instances) in roles {
        toml.push_str(&format!(
            "\n[[roles]]\nname = \"{name}\"\nkind = \"{kind}\"\ninstances = {instances}\n"
        ));
        scaffold_role(&dir, name);
    }
    std::fs::write(dir.join("cspack.toml"), toml).unwrap();
    dir
}

fn open_package(dir: &Path) -> ContainerReader {
    ContainerReader::from_path(&dir.join(PACKAGE_FILE)).unwrap()
}

fn role_entries(package: &mut ContainerReader, role: &str) -> BTreeSet<String> {
    let bytes = package.read_part(&role_part_uri(role)).unwrap();
    ContainerReader::open(bytes)
        .unwrap()
        .part_uris()
        .into_iter()
        .collect()
}

// ── Part count ──

#[test]
fn package_with_one_web_role() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 2)]);

    create_package(&dir).unwrap();

    for file in [
        SERVICE_DEFINITION_FILE,
        CLOUD_CONFIGURATION_FILE,
        LOCAL_CONFIGURATION_FILE,
    ] {
        let content = std::fs::read_to_string(dir.join(file)).unwrap();
        assert!(content.contains(SERVICE_NAME), "{file} missing service name");
    }
    assert_eq!(open_package(&dir).part_count(), 6);
}

#[test]
fn package_with_one_worker_role() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WORKER_ROLE", "worker", 2)]);

    create_package(&dir).unwrap();

    assert_eq!(open_package(&dir).part_count(), 6);
}

#[test]
fn package_with_multiple_roles() {
    let tmp = TempDir::new().unwrap();
    let dir = service(
        &tmp,
        &[("TEST_WEB_ROLE", "web", 2), ("TEST_WORKER_ROLE", "worker", 2)],
    );

    create_package(&dir).unwrap();

    assert_eq!(open_package(&dir).part_count(), 7);
}

#[test]
fn package_with_no_roles_holds_only_fixed_parts() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[]);

    create_package(&dir).unwrap();

    let package = open_package(&dir);
    assert_eq!(package.part_count(), PACKAGE_FIXED_PART_COUNT);
    assert!(package.has_part(SERVICE_DEFINITION_FILE));
    assert!(package.has_part(PACKAGE_MANIFEST_URI));
}

#[test]
fn part_count_tracks_role_count() {
    for count in 0..4 {
        let tmp = TempDir::new().unwrap();
        let names: Vec<String> = (0..count).map(|i| format!("Role{i}")).collect();
        let roles: Vec<(&str, &str, u32)> =
            names.iter().map(|n| (n.as_str(), "worker", 1)).collect();
        let dir = service(&tmp, &roles);

        create_package(&dir).unwrap();

        assert_eq!(
            open_package(&dir).part_count(),
            count + PACKAGE_FIXED_PART_COUNT
        );
    }
}

// ── Content ──

#[test]
fn role_container_preserves_relative_paths() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 1)]);

    create_package(&dir).unwrap();

    let mut package = open_package(&dir);
    let entries = role_entries(&mut package, "TEST_WEB_ROLE");
    let expected: BTreeSet<String> = [
        "Web.config",
        "[Content_Types].xml",
        "bin/node.cmd",
        "bin/setup_web.cmd",
        "package.json",
        "server.js",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();
    assert_eq!(entries, expected);

    let mut role = ContainerReader::open(package.read_part(&role_part_uri("TEST_WEB_ROLE")).unwrap())
        .unwrap();
    assert_eq!(role.read_part("bin/node.cmd").unwrap(), b"content of bin/node.cmd");
}

#[test]
fn log_directories_excluded_at_any_depth() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 1)]);
    let role = dir.join("TEST_WEB_ROLE");
    touch(&role, "logs/nested/deeper/trace.txt");
    touch(&role, "node_modules/express/logs/x.log");
    touch(&role, "a/b/c/d/e/logs/f.txt");
    touch(&role, "a/b/c/d/e/kept.txt");
    touch(&role, "Logs/kept-case.txt");
    touch(&role, "bin/logs");

    create_package(&dir).unwrap();

    let entries = role_entries(&mut open_package(&dir), "TEST_WEB_ROLE");
    assert!(
        entries.iter().all(|e| !e.split('/').rev().skip(1).any(|seg| seg == "logs")),
        "log content leaked: {entries:?}"
    );
    assert!(entries.contains("a/b/c/d/e/kept.txt"));
    assert!(entries.contains("Logs/kept-case.txt"));
    assert!(entries.contains("bin/logs"));
    assert!(entries.contains("server.js"));
}

#[test]
fn role_with_only_logs_yields_empty_container() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[]);
    let role = dir.join("Quiet");
    touch(&role, "logs/a.txt");

    let project = ServiceProject::new(&dir, SERVICE_NAME)
        .with_role(RoleDefinition::new("Quiet", RoleKind::Worker, 1, &role));
    let filter = ContentFilter::default();
    let built = PackageAssembler::new(&project, &filter).assemble().unwrap();

    let mut package = ContainerReader::open(built.bytes).unwrap();
    let inner = ContainerReader::open(package.read_part(&role_part_uri("Quiet")).unwrap()).unwrap();
    assert_eq!(inner.part_uris(), vec!["[Content_Types].xml"]);
    assert!(built.diagnostics.err.unwrap().contains("no files"));
}

#[test]
fn excluded_role_root_yields_empty_container() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("logs");
    touch(&root, "server.js");

    let project = ServiceProject::new(tmp.path(), SERVICE_NAME)
        .with_role(RoleDefinition::new("Web", RoleKind::Web, 1, &root));
    let filter = ContentFilter::default();
    let built = PackageAssembler::new(&project, &filter).assemble().unwrap();

    let mut package = ContainerReader::open(built.bytes).unwrap();
    let inner = ContainerReader::open(package.read_part(&role_part_uri("Web")).unwrap()).unwrap();
    assert_eq!(inner.part_count(), 1);
    assert!(built.diagnostics.err.unwrap().contains("excluded"));
}

#[test]
fn custom_exclusions_from_config() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("Web", "web", 1)]);
    let mut toml = std::fs::read_to_string(dir.join("cspack.toml")).unwrap();
    toml.push_str("\n[package]\nexclude_dirs = [\"tmp\"]\n");
    std::fs::write(dir.join("cspack.toml"), toml).unwrap();
    touch(&dir.join("Web"), "tmp/scratch.txt");

    create_package(&dir).unwrap();

    let entries = role_entries(&mut open_package(&dir), "Web");
    assert!(!entries.contains("tmp/scratch.txt"));
    // `logs` is only excluded by default; naming other dirs replaces it.
    assert!(entries.contains("logs/0.txt"));
}

#[test]
fn package_manifest_lists_roles_and_digests() {
    let tmp = TempDir::new().unwrap();
    let dir = service(
        &tmp,
        &[("TEST_WEB_ROLE", "web", 2), ("TEST_WORKER_ROLE", "worker", 3)],
    );

    create_package(&dir).unwrap();

    let mut package = open_package(&dir);
    let manifest = String::from_utf8(package.read_part(PACKAGE_MANIFEST_URI).unwrap()).unwrap();
    assert!(manifest.contains(SERVICE_NAME));
    assert!(manifest.contains(r#"name="TEST_WEB_ROLE" kind="web" instances="2" uri="roles/TEST_WEB_ROLE.cssx" files="5""#));
    assert!(manifest.contains(r#"name="TEST_WORKER_ROLE" kind="worker" instances="3""#));
    assert_eq!(manifest.matches("sha256=").count(), 5);
}

// ── Manifests ──

#[test]
fn manifests_name_service_and_every_role() {
    let tmp = TempDir::new().unwrap();
    let dir = service(
        &tmp,
        &[("TEST_WEB_ROLE", "web", 2), ("TEST_WORKER_ROLE", "worker", 2)],
    );

    create_package(&dir).unwrap();

    let mut package = open_package(&dir);
    for file in [
        SERVICE_DEFINITION_FILE,
        CLOUD_CONFIGURATION_FILE,
        LOCAL_CONFIGURATION_FILE,
    ] {
        let on_disk = std::fs::read_to_string(dir.join(file)).unwrap();
        let packed = String::from_utf8(package.read_part(file).unwrap()).unwrap();
        assert_eq!(on_disk, packed, "{file} differs between disk and package");
        for token in [SERVICE_NAME, "TEST_WEB_ROLE", "TEST_WORKER_ROLE"] {
            assert!(on_disk.contains(token), "{file} missing {token}");
        }
    }
}

#[test]
fn write_manifests_only_writes_documents() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 2)]);

    let written = write_manifests(&dir).unwrap();

    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|p| p.exists()));
    assert!(!dir.join(PACKAGE_FILE).exists());
}

// ── Determinism ──

#[test]
fn repeated_packaging_is_structurally_identical() {
    let tmp = TempDir::new().unwrap();
    let dir = service(
        &tmp,
        &[("TEST_WEB_ROLE", "web", 2), ("TEST_WORKER_ROLE", "worker", 2)],
    );

    create_package(&dir).unwrap();
    let first = open_package(&dir);
    let first_uris = first.part_uris();
    let first_bytes = std::fs::read(dir.join(PACKAGE_FILE)).unwrap();

    create_package(&dir).unwrap();
    let second = open_package(&dir);

    assert_eq!(first.part_count(), second.part_count());
    assert_eq!(first_uris, second.part_uris());
    assert_eq!(first_bytes, std::fs::read(dir.join(PACKAGE_FILE)).unwrap());
}

#[test]
fn role_order_does_not_change_structure() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("Alpha", "web", 1), ("Beta", "worker", 1)]);
    let filter = ContentFilter::default();

    let forward = ServiceProject::new(&dir, SERVICE_NAME)
        .with_role(RoleDefinition::new("Alpha", RoleKind::Web, 1, dir.join("Alpha")))
        .with_role(RoleDefinition::new("Beta", RoleKind::Worker, 1, dir.join("Beta")));
    let reverse = ServiceProject::new(&dir, SERVICE_NAME)
        .with_role(RoleDefinition::new("Beta", RoleKind::Worker, 1, dir.join("Beta")))
        .with_role(RoleDefinition::new("Alpha", RoleKind::Web, 1, dir.join("Alpha")));

    let a = PackageAssembler::new(&forward, &filter).assemble().unwrap();
    let b = PackageAssembler::new(&reverse, &filter).assemble().unwrap();

    assert_eq!(a.part_count(), b.part_count());
    assert_eq!(a.part_uris, b.part_uris);
}

// ── Failures ──

#[test]
fn duplicate_role_fails_validation_without_touching_artifact() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 1)]);
    create_package(&dir).unwrap();
    let before = std::fs::read(dir.join(PACKAGE_FILE)).unwrap();
    let definition_before = std::fs::read(dir.join(SERVICE_DEFINITION_FILE)).unwrap();

    let mut toml = std::fs::read_to_string(dir.join("cspack.toml")).unwrap();
    toml.push_str("\n[[roles]]\nname = \"TEST_WEB_ROLE\"\nkind = \"worker\"\n");
    std::fs::write(dir.join("cspack.toml"), toml).unwrap();

    let err = create_package(&dir).unwrap_err();

    assert!(
        matches!(err, Error::Validation(ValidationError::DuplicateRole { .. })),
        "got: {err}"
    );
    assert_eq!(std::fs::read(dir.join(PACKAGE_FILE)).unwrap(), before);
    assert_eq!(
        std::fs::read(dir.join(SERVICE_DEFINITION_FILE)).unwrap(),
        definition_before
    );
}

#[test]
fn duplicate_role_produces_no_artifact() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("Web", "web", 1), ("Web", "web", 1)]);

    let err = create_package(&dir).unwrap_err();

    assert!(matches!(err, Error::Validation(_)), "got: {err}");
    assert!(!dir.join(PACKAGE_FILE).exists());
    assert!(!dir.join(SERVICE_DEFINITION_FILE).exists());
}

#[test]
fn illegal_role_name_fails_validation() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().to_path_buf();
    let project = ServiceProject::new(&dir, SERVICE_NAME).with_role(RoleDefinition::new(
        "bad role",
        RoleKind::Web,
        1,
        dir.join("bad role"),
    ));
    let filter = ContentFilter::default();

    let err = PackageAssembler::new(&project, &filter)
        .write_to(&dir.join(PACKAGE_FILE))
        .unwrap_err();

    assert!(matches!(err, Error::Validation(ValidationError::InvalidRoleName { .. })));
    assert!(!dir.join(PACKAGE_FILE).exists());
}

#[test]
fn missing_output_directory_is_packaging_error() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 1)]);
    let project = ServiceProject::new(&dir, SERVICE_NAME).with_role(RoleDefinition::new(
        "TEST_WEB_ROLE",
        RoleKind::Web,
        1,
        dir.join("TEST_WEB_ROLE"),
    ));
    let filter = ContentFilter::default();
    let output = tmp.path().join("missing").join(PACKAGE_FILE);

    let err = PackageAssembler::new(&project, &filter)
        .write_to(&output)
        .unwrap_err();

    assert!(
        matches!(err, Error::Packaging(PackagingError::OutputDirMissing { .. })),
        "got: {err}"
    );
    assert!(!output.exists());
    assert!(!tmp.path().join("missing").exists());
}

#[test]
fn missing_role_root_is_packaging_error_with_context() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 1)]);
    std::fs::remove_dir_all(dir.join("TEST_WEB_ROLE")).unwrap();

    let err = create_package(&dir).unwrap_err();

    assert!(
        matches!(
            err,
            Error::Packaging(PackagingError::RoleRootMissing { ref role, .. }) if role == "TEST_WEB_ROLE"
        ),
        "got: {err}"
    );
    assert!(err.to_string().contains("TEST_WEB_ROLE"));
    assert!(!dir.join(PACKAGE_FILE).exists());
}

#[test]
fn missing_config_is_reported() {
    let tmp = TempDir::new().unwrap();

    let err = create_package(tmp.path()).unwrap_err();

    assert!(matches!(err, Error::Config(_)), "got: {err}");
}

#[cfg(unix)]
#[test]
fn unreadable_role_tree_keeps_previous_artifact() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 1)]);
    create_package(&dir).unwrap();
    let before = std::fs::read(dir.join(PACKAGE_FILE)).unwrap();

    let locked = dir.join("TEST_WEB_ROLE/bin");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
    // Permission bits do not bind root; nothing to observe then.
    if std::fs::read_dir(&locked).is_ok() {
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let err = create_package(&dir).unwrap_err();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(err, Error::Packaging(_)), "got: {err}");
    assert_eq!(std::fs::read(dir.join(PACKAGE_FILE)).unwrap(), before);
}

#[test]
fn manifest_write_failure_keeps_previous_artifact() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 1)]);
    create_package(&dir).unwrap();
    let before = std::fs::read(dir.join(PACKAGE_FILE)).unwrap();

    // A non-empty directory in place of a manifest cannot be renamed over.
    let blocked = dir.join(CLOUD_CONFIGURATION_FILE);
    std::fs::remove_file(&blocked).unwrap();
    touch(&blocked, "occupied.txt");
    std::fs::write(dir.join("TEST_WEB_ROLE/server.js"), "changed").unwrap();

    let err = create_package(&dir).unwrap_err();

    assert!(
        matches!(err, Error::Packaging(PackagingError::Write { ref path, .. }) if *path == blocked),
        "got: {err}"
    );
    assert_eq!(std::fs::read(dir.join(PACKAGE_FILE)).unwrap(), before);
    let leftovers: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
}

#[cfg(target_os = "linux")]
#[test]
fn file_names_differing_only_in_case_collide() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 1)]);
    touch(&dir.join("TEST_WEB_ROLE"), "README");
    touch(&dir.join("TEST_WEB_ROLE"), "readme");

    let err = create_package(&dir).unwrap_err();

    assert!(
        matches!(
            err,
            Error::Packaging(PackagingError::Container {
                source: ContainerError::DuplicatePart { .. },
                ..
            })
        ),
        "got: {err}"
    );
    assert!(!dir.join(PACKAGE_FILE).exists());
}

#[cfg(unix)]
#[test]
fn written_files_keep_default_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 1)]);

    create_package(&dir).unwrap();

    for file in [PACKAGE_FILE, SERVICE_DEFINITION_FILE, CLOUD_CONFIGURATION_FILE] {
        let mode = std::fs::metadata(dir.join(file)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644, "{file}");
    }
}

// ── Diagnostics ──

#[test]
fn diagnostics_report_counts_without_errors() {
    let tmp = TempDir::new().unwrap();
    let dir = service(&tmp, &[("TEST_WEB_ROLE", "web", 2)]);

    let diagnostics = create_package(&dir).unwrap();

    let out = diagnostics.out.unwrap();
    assert!(out.contains("TEST_WEB_ROLE"));
    assert!(out.contains("5 files, 1 excluded directories"));
    assert!(out.contains("6 parts"));
    assert!(diagnostics.err.is_none());
}
