//! End-to-end tests of the stack-backup binary

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// compose/{web,db} plus an appdata root and an empty backup dir
///
/// No `config.yaml` is written, so defaults apply unless a test adds one.
fn fleet() -> TempDir {
    let temp = TempDir::new().unwrap();
    for project in ["web", "db"] {
        let dir = temp.path().join("compose").join(project);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("docker-compose.yml"), "services: {}\n").unwrap();
    }
    fs::create_dir_all(temp.path().join("compose/notes")).unwrap();
    fs::create_dir_all(temp.path().join("appdata")).unwrap();
    fs::create_dir_all(temp.path().join("backups")).unwrap();
    temp
}

fn stack_backup(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stack-backup").unwrap();
    for (key, _) in std::env::vars() {
        if key.starts_with("DOCKER_BACKUP_") {
            cmd.env_remove(key);
        }
    }
    cmd.env_remove("RUST_LOG")
        .arg("--config")
        .arg(root.join("config.yaml"))
        .arg("--compose-dir")
        .arg(root.join("compose"))
        .arg("--appdata-dir")
        .arg(root.join("appdata"))
        .arg("--backup-dir")
        .arg(root.join("backups"))
        .arg("--log-file")
        .arg(root.join("logs/backup.log"));
    cmd
}

#[test]
fn test_dry_run_touches_nothing() {
    let root = fleet();

    // `sh` stands in for rsync so the executable check passes on any host
    stack_backup(root.path())
        .args([
            "run",
            "--dry-run",
            "--restart-after-backup",
            "--rsync-enabled",
            "--rsync-destination",
            "nas:/backups",
            "--rsync-command",
            "sh",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN MODE ENABLED"))
        .stdout(predicate::str::contains("[DRY RUN] Would stop stack"))
        .stdout(predicate::str::contains("[DRY RUN] Would create archive"))
        .stdout(predicate::str::contains("[DRY RUN] Would transfer"))
        .stdout(predicate::str::contains("nas:/backups"))
        .stdout(predicate::str::contains("[DRY RUN] Would start stack"))
        .stdout(predicate::str::contains("2 succeeded, 0 failed"));

    assert_eq!(fs::read_dir(root.path().join("backups")).unwrap().count(), 0);
    let log = fs::read_to_string(root.path().join("logs/backup.log")).unwrap();
    assert!(log.contains("Processing project: db"));
    assert!(log.contains("Processing project: web"));
}

#[test]
fn test_default_command_is_run() {
    let root = fleet();

    stack_backup(root.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("[DRY RUN] Would verify"));
}

#[test]
fn test_list_shows_projects() {
    let root = fleet();

    stack_backup(root.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("db"))
        .stdout(predicate::str::contains("web"))
        .stdout(predicate::str::contains("notes").not())
        .stdout(predicate::str::contains("2 project(s)"));
}

#[test]
fn test_missing_compose_dir_fails() {
    let root = TempDir::new().unwrap();

    stack_backup(root.path())
        .args(["run", "--dry-run"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("compose directory"));
}

#[test]
fn test_no_projects_fails() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("compose/empty")).unwrap();

    stack_backup(root.path())
        .args(["run", "--dry-run"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No projects"));
}

#[test]
fn test_invalid_exclude_pattern_fails_before_run() {
    let root = fleet();

    stack_backup(root.path())
        .args(["run", "--dry-run", "--exclude", "cache/[oops"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cache/[oops"));
}

#[test]
fn test_config_prints_effective_settings() {
    let root = fleet();
    let config = root.path().join("config.yaml");
    fs::write(&config, "restart_after_backup: true\nexclude_patterns:\n  - '**/*.log'\n").unwrap();

    stack_backup(root.path())
        .args(["config", "--exclude", "cache/**"])
        .assert()
        .success()
        .stdout(predicate::str::contains("restart_after_backup: true"))
        .stdout(predicate::str::contains("cache/**"))
        .stdout(predicate::str::contains("*.log").not());
}

#[test]
fn test_dotenv_file_feeds_environment_layer() {
    let root = fleet();
    fs::write(
        root.path().join(".env"),
        "DOCKER_BACKUP_EXCLUDE=from-dotenv/**\nDOCKER_BACKUP_LOG_ROTATION_MAX_BACKUPS=9\n",
    )
    .unwrap();

    stack_backup(root.path())
        .current_dir(root.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("from-dotenv/**"))
        .stdout(predicate::str::contains("log_rotation_max_backups: 9"));
}
