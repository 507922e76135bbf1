//! Per-project backup pipeline
//!
//! Each project runs through a fixed sequence of steps:
//!
//! ```text
//! Stop -> Verify -> ResolveVolumes -> Archive -> Transfer -> Restart
//! ```
//!
//! Once a step marks the project failed, every later step is logged as
//! skipped and not executed. A failed project never stops the run; the next
//! project starts from a clean slate. Volume resolution is the one step whose
//! failure only degrades the backup (no appdata) instead of failing it.
//!
//! In dry-run mode every side-effecting step is replaced by a `[DRY RUN]` log
//! line and counts as succeeded, so the log has the same shape as a real run.

use std::fmt;
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, info_span, warn};

use super::archive::ArchiveBuilder;
use crate::config::Settings;
use crate::discovery::Project;
use crate::docker::{StackController, VolumeResolver};
use crate::transfer::Transfer;

/// Pipeline steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Stop,
    Verify,
    ResolveVolumes,
    Archive,
    Transfer,
    Restart,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Stop => "stop",
            Step::Verify => "verify",
            Step::ResolveVolumes => "resolve volumes",
            Step::Archive => "archive",
            Step::Transfer => "transfer",
            Step::Restart => "restart",
        };
        write!(f, "{}", name)
    }
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    /// Marked the project failed
    Failed,
    /// Went wrong without failing the project
    Degraded,
    /// Not run because an earlier step failed
    Skipped,
    /// Dry run; logged instead of executed
    Simulated,
    /// Turned off by configuration
    Disabled,
}

/// One step's result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub message: Option<String>,
}

/// Result of one project's pass through the pipeline
#[derive(Debug, Clone)]
pub struct ProjectOutcome {
    pub project: String,
    /// Set by the first failing step and never cleared
    pub failed: bool,
    /// Archive written (or, in a dry run, that would have been written)
    pub archive: Option<PathBuf>,
    pub steps: Vec<StepRecord>,
}

impl ProjectOutcome {
    fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            failed: false,
            archive: None,
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: Step, status: StepStatus, message: Option<String>) {
        if status == StepStatus::Failed {
            self.failed = true;
        }
        self.steps.push(StepRecord {
            step,
            status,
            message,
        });
    }

    fn fail(&mut self, step: Step, message: String) {
        error!("{}", message);
        self.record(step, StepStatus::Failed, Some(message));
    }

    fn skip(&mut self, step: Step) {
        info!("Skipping {} because a previous step failed", step);
        self.record(step, StepStatus::Skipped, None);
    }

    /// Status recorded for `step`, if it was reached
    pub fn status(&self, step: Step) -> Option<StepStatus> {
        self.steps.iter().find(|r| r.step == step).map(|r| r.status)
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<ProjectOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.failed).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failed).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Process exit status: 0 when every project succeeded, else 1
    pub fn exit_code(&self) -> u8 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }

    /// Names of failed projects, in run order
    pub fn failed_projects(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.failed)
            .map(|o| o.project.as_str())
            .collect()
    }
}

/// Drives the pipeline over a list of projects
pub struct BackupRunner<'a> {
    settings: &'a Settings,
    stack: &'a dyn StackController,
    volumes: &'a dyn VolumeResolver,
    transfer: &'a dyn Transfer,
    archiver: ArchiveBuilder,
    date: NaiveDate,
}

impl<'a> BackupRunner<'a> {
    pub fn new(
        settings: &'a Settings,
        stack: &'a dyn StackController,
        volumes: &'a dyn VolumeResolver,
        transfer: &'a dyn Transfer,
    ) -> Self {
        let archiver = ArchiveBuilder::new(&settings.backup_dir, settings.exclude_patterns.clone())
            .with_policy(settings.traversal_errors);
        Self {
            settings,
            stack,
            volumes,
            transfer,
            archiver,
            date: Local::now().date_naive(),
        }
    }

    /// Replace the archive builder
    pub fn with_archiver(mut self, archiver: ArchiveBuilder) -> Self {
        self.archiver = archiver;
        self
    }

    /// Stamp archives with `date` instead of today
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Process every project in order and report the totals
    pub fn run(&self, projects: &[Project]) -> RunSummary {
        let mut summary = RunSummary::default();
        for project in projects {
            summary.outcomes.push(self.process_project(project));
        }

        info!("=== Backup run finished ===");
        info!("Successfully processed: {} projects", summary.succeeded());
        if summary.all_succeeded() {
            info!("Failed projects: 0");
        } else {
            error!(
                "Failed projects: {} ({})",
                summary.failed(),
                summary.failed_projects().join(", ")
            );
        }

        summary
    }

    /// Run the pipeline for a single project
    pub fn process_project(&self, project: &Project) -> ProjectOutcome {
        let span = info_span!("project", name = %project.name);
        let _enter = span.enter();

        info!("--- Processing project: {} ---", project.name);
        let mut outcome = ProjectOutcome::new(&project.name);

        self.stop(project, &mut outcome);
        self.verify(project, &mut outcome);
        let data_paths = self.resolve_volumes(project, &mut outcome);
        self.archive(project, &data_paths, &mut outcome);
        self.send(&mut outcome);
        self.restart(project, &mut outcome);

        if outcome.failed {
            error!("--- Finished project {} with errors ---", project.name);
        } else {
            info!("--- Finished project {} successfully ---", project.name);
        }
        outcome
    }

    fn dry_run(&self) -> bool {
        self.settings.dry_run
    }

    fn stop(&self, project: &Project, outcome: &mut ProjectOutcome) {
        let dir = &project.definition_dir;
        if self.dry_run() {
            info!("[DRY RUN] Would stop stack in {}", dir.display());
            outcome.record(Step::Stop, StepStatus::Simulated, None);
            return;
        }

        info!("Stopping stack...");
        match self.stack.stop(dir) {
            Ok(()) => outcome.record(Step::Stop, StepStatus::Succeeded, None),
            Err(e) => outcome.fail(
                Step::Stop,
                format!("Failed to stop stack for {}: {}", project.name, e),
            ),
        }
    }

    fn verify(&self, project: &Project, outcome: &mut ProjectOutcome) {
        if outcome.failed {
            return outcome.skip(Step::Verify);
        }
        if self.dry_run() {
            info!("[DRY RUN] Would verify that all containers are stopped");
            outcome.record(Step::Verify, StepStatus::Simulated, None);
            return;
        }

        info!("Verifying stack is stopped...");
        match self.stack.is_running(&project.definition_dir) {
            Ok(false) => {
                info!("Stack confirmed stopped");
                outcome.record(Step::Verify, StepStatus::Succeeded, None);
            }
            Ok(true) => outcome.fail(
                Step::Verify,
                format!(
                    "Stack for {} still has running containers after stop",
                    project.name
                ),
            ),
            Err(e) => outcome.fail(
                Step::Verify,
                format!("Failed to verify stack status for {}: {}", project.name, e),
            ),
        }
    }

    /// Read-only, so it runs in dry-run mode too
    fn resolve_volumes(&self, project: &Project, outcome: &mut ProjectOutcome) -> Vec<PathBuf> {
        if outcome.failed {
            outcome.skip(Step::ResolveVolumes);
            return Vec::new();
        }

        info!("Finding appdata volumes...");
        match self
            .volumes
            .resolve(&project.definition_file, &self.settings.appdata_dir)
        {
            Ok(paths) => {
                if paths.is_empty() {
                    info!(
                        "No appdata bind mounts under {}",
                        self.settings.appdata_dir.display()
                    );
                }
                for path in &paths {
                    debug!("Found appdata path: {}", path.display());
                }
                outcome.record(
                    Step::ResolveVolumes,
                    StepStatus::Succeeded,
                    Some(format!("{} appdata paths", paths.len())),
                );
                paths
            }
            Err(e) => {
                let message = format!(
                    "Could not determine appdata volumes: {}. Continuing without appdata.",
                    e
                );
                warn!("{}", message);
                outcome.record(Step::ResolveVolumes, StepStatus::Degraded, Some(message));
                Vec::new()
            }
        }
    }

    fn archive(&self, project: &Project, data_paths: &[PathBuf], outcome: &mut ProjectOutcome) {
        if outcome.failed {
            return outcome.skip(Step::Archive);
        }
        if self.dry_run() {
            let target = self.archiver.archive_path(&project.name, self.date);
            info!(
                "[DRY RUN] Would create archive {} from {} and {} appdata paths",
                target.display(),
                project.definition_dir.display(),
                data_paths.len()
            );
            outcome.archive = Some(target);
            outcome.record(Step::Archive, StepStatus::Simulated, None);
            return;
        }

        info!("Creating archive...");
        match self.archiver.build_dated(
            &project.name,
            &project.definition_dir,
            data_paths,
            self.date,
        ) {
            Ok(path) => {
                info!("Archive created: {}", path.display());
                outcome.archive = Some(path);
                outcome.record(Step::Archive, StepStatus::Succeeded, None);
            }
            Err(e) => outcome.fail(
                Step::Archive,
                format!("Failed to create archive for {}: {}", project.name, e),
            ),
        }
    }

    fn send(&self, outcome: &mut ProjectOutcome) {
        if outcome.failed {
            return outcome.skip(Step::Transfer);
        }
        let rsync = &self.settings.rsync;
        if !rsync.enabled {
            debug!("Transfer disabled");
            outcome.record(Step::Transfer, StepStatus::Disabled, None);
            return;
        }
        if !rsync.is_active() {
            let message = "Transfer enabled but no destination configured, skipping".to_string();
            warn!("{}", message);
            outcome.record(Step::Transfer, StepStatus::Disabled, Some(message));
            return;
        }
        let Some(archive) = outcome.archive.clone() else {
            return outcome.fail(Step::Transfer, "No archive to transfer".to_string());
        };

        if self.dry_run() {
            info!(
                "[DRY RUN] Would transfer {} to {} with options '{}'",
                archive.display(),
                rsync.destination,
                rsync.options
            );
            outcome.record(Step::Transfer, StepStatus::Simulated, None);
            return;
        }

        info!("Transferring archive to {}...", rsync.destination);
        match self
            .transfer
            .send(&archive, &rsync.destination, &rsync.options)
        {
            Ok(()) => {
                info!("Transfer complete");
                outcome.record(Step::Transfer, StepStatus::Succeeded, None);
            }
            Err(e) => outcome.fail(
                Step::Transfer,
                format!(
                    "Failed to transfer {} to {}: {}",
                    archive.display(),
                    rsync.destination,
                    e
                ),
            ),
        }
    }

    fn restart(&self, project: &Project, outcome: &mut ProjectOutcome) {
        if outcome.failed {
            info!("Skipping restart because the backup failed");
            outcome.record(Step::Restart, StepStatus::Skipped, None);
            return;
        }
        if !self.settings.restart_after_backup {
            info!("Restart after backup disabled; stack left stopped");
            outcome.record(Step::Restart, StepStatus::Disabled, None);
            return;
        }

        let dir = &project.definition_dir;
        if self.dry_run() {
            if self.settings.pull_before_restart {
                info!("[DRY RUN] Would pull images in {}", dir.display());
            }
            info!("[DRY RUN] Would start stack in {}", dir.display());
            outcome.record(Step::Restart, StepStatus::Simulated, None);
            return;
        }

        if self.settings.pull_before_restart {
            info!("Pulling images...");
            if let Err(e) = self.stack.pull(dir) {
                warn!("Failed to pull images for {}: {}. Restarting anyway.", project.name, e);
            }
        }

        info!("Starting stack...");
        match self.stack.start_detached(dir) {
            Ok(()) => {
                info!("Stack started");
                outcome.record(Step::Restart, StepStatus::Succeeded, None);
            }
            Err(e) => outcome.fail(
                Step::Restart,
                format!("Failed to start stack for {}: {}", project.name, e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::discover;
    use crate::error::{BackupError, BackupResult};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn name_of(dir: &Path) -> String {
        dir.file_name().unwrap().to_string_lossy().to_string()
    }

    #[derive(Default)]
    struct FakeStack {
        calls: RefCell<Vec<String>>,
        fail_stop: HashSet<String>,
        still_running: HashSet<String>,
        fail_pull: bool,
        fail_start: HashSet<String>,
    }

    impl FakeStack {
        fn log(&self, action: &str, dir: &Path) {
            self.calls
                .borrow_mut()
                .push(format!("{} {}", action, name_of(dir)));
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl StackController for FakeStack {
        fn stop(&self, dir: &Path) -> BackupResult<()> {
            self.log("stop", dir);
            if self.fail_stop.contains(&name_of(dir)) {
                return Err(BackupError::StackControl("daemon not reachable".into()));
            }
            Ok(())
        }

        fn is_running(&self, dir: &Path) -> BackupResult<bool> {
            self.log("ps", dir);
            Ok(self.still_running.contains(&name_of(dir)))
        }

        fn pull(&self, dir: &Path) -> BackupResult<()> {
            self.log("pull", dir);
            if self.fail_pull {
                return Err(BackupError::StackControl("registry unreachable".into()));
            }
            Ok(())
        }

        fn start_detached(&self, dir: &Path) -> BackupResult<()> {
            self.log("up", dir);
            if self.fail_start.contains(&name_of(dir)) {
                return Err(BackupError::StackControl("port already allocated".into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeVolumes {
        paths: Vec<PathBuf>,
        fail: bool,
    }

    impl VolumeResolver for FakeVolumes {
        fn resolve(&self, _: &Path, _: &Path) -> BackupResult<Vec<PathBuf>> {
            if self.fail {
                return Err(BackupError::VolumeResolution("config failed".into()));
            }
            Ok(self.paths.clone())
        }
    }

    #[derive(Default)]
    struct FakeTransfer {
        sent: RefCell<Vec<(PathBuf, String, String)>>,
        fail: bool,
    }

    impl Transfer for FakeTransfer {
        fn send(&self, local: &Path, destination: &str, options: &str) -> BackupResult<()> {
            self.sent
                .borrow_mut()
                .push((local.to_path_buf(), destination.into(), options.into()));
            if self.fail {
                return Err(BackupError::Transfer("connection refused".into()));
            }
            Ok(())
        }
    }

    struct Fixture {
        temp: TempDir,
        settings: Settings,
        projects: Vec<Project>,
    }

    impl Fixture {
        fn new(names: &[&str]) -> Self {
            let temp = TempDir::new().unwrap();
            let compose = temp.path().join("compose");
            fs::create_dir_all(&compose).unwrap();
            for name in names {
                let dir = compose.join(name);
                fs::create_dir_all(&dir).unwrap();
                fs::write(dir.join("docker-compose.yml"), "services: {}\n").unwrap();
            }
            fs::create_dir_all(temp.path().join("appdata")).unwrap();
            fs::create_dir_all(temp.path().join("staging")).unwrap();

            let settings = Settings {
                compose_dir: compose.clone(),
                appdata_dir: temp.path().join("appdata"),
                backup_dir: temp.path().join("backups"),
                ..Settings::default()
            };
            let projects = discover(&compose).unwrap();
            Self {
                temp,
                settings,
                projects,
            }
        }

        fn date() -> NaiveDate {
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        }

        fn run(
            &self,
            stack: &FakeStack,
            volumes: &FakeVolumes,
            transfer: &FakeTransfer,
        ) -> RunSummary {
            let archiver = ArchiveBuilder::new(
                &self.settings.backup_dir,
                self.settings.exclude_patterns.clone(),
            )
            .with_staging_parent(self.temp.path().join("staging"));
            BackupRunner::new(&self.settings, stack, volumes, transfer)
                .with_archiver(archiver)
                .with_date(Self::date())
                .run(&self.projects)
        }

        fn archive(&self, project: &str) -> PathBuf {
            self.settings
                .backup_dir
                .join(format!("{}_20240309.zip", project))
        }
    }

    #[test]
    fn test_all_steps_succeed() {
        let mut fx = Fixture::new(&["app"]);
        fx.settings.restart_after_backup = true;
        let stack = FakeStack::default();

        let summary = fx.run(&stack, &FakeVolumes::default(), &FakeTransfer::default());

        assert!(summary.all_succeeded());
        assert_eq!(summary.exit_code(), 0);
        let outcome = &summary.outcomes[0];
        assert_eq!(outcome.status(Step::Stop), Some(StepStatus::Succeeded));
        assert_eq!(outcome.status(Step::Verify), Some(StepStatus::Succeeded));
        assert_eq!(outcome.status(Step::Archive), Some(StepStatus::Succeeded));
        assert_eq!(outcome.status(Step::Transfer), Some(StepStatus::Disabled));
        assert_eq!(outcome.status(Step::Restart), Some(StepStatus::Succeeded));
        assert_eq!(outcome.archive.as_deref(), Some(fx.archive("app").as_path()));
        assert!(fx.archive("app").exists());
        assert_eq!(stack.calls(), vec!["stop app", "ps app", "up app"]);
    }

    #[test]
    fn test_failed_stop_isolated_to_project() {
        let mut fx = Fixture::new(&["p1", "p2", "p3"]);
        fx.settings.restart_after_backup = true;
        let stack = FakeStack {
            fail_stop: HashSet::from(["p2".to_string()]),
            ..FakeStack::default()
        };

        let summary = fx.run(&stack, &FakeVolumes::default(), &FakeTransfer::default());

        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.failed_projects(), vec!["p2"]);

        let p2 = &summary.outcomes[1];
        assert!(p2.failed);
        assert_eq!(p2.status(Step::Stop), Some(StepStatus::Failed));
        for step in [
            Step::Verify,
            Step::ResolveVolumes,
            Step::Archive,
            Step::Transfer,
            Step::Restart,
        ] {
            assert_eq!(p2.status(step), Some(StepStatus::Skipped), "{}", step);
        }

        assert!(fx.archive("p1").exists());
        assert!(!fx.archive("p2").exists());
        assert!(fx.archive("p3").exists());
        assert_eq!(
            stack.calls(),
            vec!["stop p1", "ps p1", "up p1", "stop p2", "stop p3", "ps p3", "up p3"]
        );
    }

    #[test]
    fn test_still_running_fails_verify() {
        let fx = Fixture::new(&["web"]);
        let stack = FakeStack {
            still_running: HashSet::from(["web".to_string()]),
            ..FakeStack::default()
        };

        let summary = fx.run(&stack, &FakeVolumes::default(), &FakeTransfer::default());

        let outcome = &summary.outcomes[0];
        assert_eq!(outcome.status(Step::Verify), Some(StepStatus::Failed));
        assert_eq!(outcome.status(Step::Archive), Some(StepStatus::Skipped));
        assert!(!fx.archive("web").exists());
    }

    #[test]
    fn test_volume_failure_degrades() {
        let fx = Fixture::new(&["app"]);
        let volumes = FakeVolumes {
            fail: true,
            ..FakeVolumes::default()
        };

        let summary = fx.run(&FakeStack::default(), &volumes, &FakeTransfer::default());

        let outcome = &summary.outcomes[0];
        assert!(!outcome.failed);
        assert_eq!(outcome.status(Step::ResolveVolumes), Some(StepStatus::Degraded));
        assert_eq!(outcome.status(Step::Archive), Some(StepStatus::Succeeded));
    }

    #[test]
    fn test_appdata_included_in_archive() {
        let fx = Fixture::new(&["app"]);
        let data = fx.settings.appdata_dir.join("app-db");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("db.sqlite"), b"rows").unwrap();
        let volumes = FakeVolumes {
            paths: vec![data],
            fail: false,
        };

        fx.run(&FakeStack::default(), &volumes, &FakeTransfer::default());

        let file = fs::File::open(fx.archive("app")).unwrap();
        let zip = zip::ZipArchive::new(file).unwrap();
        let names: Vec<&str> = zip.file_names().collect();
        assert!(names.contains(&"appdata/app-db/db.sqlite"));
        assert!(names.contains(&"compose/app/docker-compose.yml"));
    }

    #[test]
    fn test_archive_failure_marks_failed() {
        let mut fx = Fixture::new(&["app"]);
        fx.settings.restart_after_backup = true;
        fs::remove_dir_all(fx.projects[0].definition_dir.clone()).unwrap();
        let stack = FakeStack::default();

        let summary = fx.run(&stack, &FakeVolumes::default(), &FakeTransfer::default());

        let outcome = &summary.outcomes[0];
        assert_eq!(outcome.status(Step::Archive), Some(StepStatus::Failed));
        assert_eq!(outcome.status(Step::Restart), Some(StepStatus::Skipped));
        assert!(!stack.calls().iter().any(|c| c.starts_with("up")));
    }

    #[test]
    fn test_transfer_sends_archive() {
        let mut fx = Fixture::new(&["app"]);
        fx.settings.rsync.enabled = true;
        fx.settings.rsync.destination = "backup@nas:/srv/backups/".into();
        let transfer = FakeTransfer::default();

        let summary = fx.run(&FakeStack::default(), &FakeVolumes::default(), &transfer);

        assert!(summary.all_succeeded());
        let sent = transfer.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, fx.archive("app"));
        assert_eq!(sent[0].1, "backup@nas:/srv/backups/");
        assert_eq!(sent[0].2, "--archive --partial --compress --delete");
    }

    #[test]
    fn test_transfer_failure_skips_restart() {
        let mut fx = Fixture::new(&["app"]);
        fx.settings.restart_after_backup = true;
        fx.settings.rsync.enabled = true;
        fx.settings.rsync.destination = "nas:/backups".into();
        let stack = FakeStack::default();
        let transfer = FakeTransfer {
            fail: true,
            ..FakeTransfer::default()
        };

        let summary = fx.run(&stack, &FakeVolumes::default(), &transfer);

        let outcome = &summary.outcomes[0];
        assert_eq!(outcome.status(Step::Transfer), Some(StepStatus::Failed));
        assert_eq!(outcome.status(Step::Restart), Some(StepStatus::Skipped));
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_transfer_without_destination_is_not_failure() {
        let mut fx = Fixture::new(&["app"]);
        fx.settings.rsync.enabled = true;
        let transfer = FakeTransfer::default();

        let summary = fx.run(&FakeStack::default(), &FakeVolumes::default(), &transfer);

        assert!(summary.all_succeeded());
        assert_eq!(
            summary.outcomes[0].status(Step::Transfer),
            Some(StepStatus::Disabled)
        );
        assert!(transfer.sent.borrow().is_empty());
    }

    #[test]
    fn test_pull_failure_still_restarts() {
        let mut fx = Fixture::new(&["app"]);
        fx.settings.restart_after_backup = true;
        fx.settings.pull_before_restart = true;
        let stack = FakeStack {
            fail_pull: true,
            ..FakeStack::default()
        };

        let summary = fx.run(&stack, &FakeVolumes::default(), &FakeTransfer::default());

        assert!(summary.all_succeeded());
        assert_eq!(stack.calls(), vec!["stop app", "ps app", "pull app", "up app"]);
    }

    #[test]
    fn test_restart_failure_marks_failed() {
        let mut fx = Fixture::new(&["app"]);
        fx.settings.restart_after_backup = true;
        let stack = FakeStack {
            fail_start: HashSet::from(["app".to_string()]),
            ..FakeStack::default()
        };

        let summary = fx.run(&stack, &FakeVolumes::default(), &FakeTransfer::default());

        assert_eq!(
            summary.outcomes[0].status(Step::Restart),
            Some(StepStatus::Failed)
        );
        // The archive is still on disk; only the project status changes
        assert!(fx.archive("app").exists());
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_restart_disabled_leaves_stack_stopped() {
        let fx = Fixture::new(&["app"]);
        let stack = FakeStack::default();

        let summary = fx.run(&stack, &FakeVolumes::default(), &FakeTransfer::default());

        assert_eq!(
            summary.outcomes[0].status(Step::Restart),
            Some(StepStatus::Disabled)
        );
        assert_eq!(stack.calls(), vec!["stop app", "ps app"]);
    }

    #[test]
    fn test_dry_run_has_no_side_effects() {
        let mut fx = Fixture::new(&["a", "b"]);
        fx.settings.dry_run = true;
        fx.settings.restart_after_backup = true;
        fx.settings.pull_before_restart = true;
        fx.settings.rsync.enabled = true;
        fx.settings.rsync.destination = "nas:/backups".into();
        let stack = FakeStack::default();
        let transfer = FakeTransfer::default();

        let summary = fx.run(&stack, &FakeVolumes::default(), &transfer);

        assert!(summary.all_succeeded());
        assert!(stack.calls().is_empty());
        assert!(transfer.sent.borrow().is_empty());
        assert!(!fx.settings.backup_dir.exists());
        assert_eq!(
            fs::read_dir(fx.temp.path().join("staging")).unwrap().count(),
            0
        );

        let outcome = &summary.outcomes[0];
        for step in [Step::Stop, Step::Verify, Step::Archive, Step::Transfer, Step::Restart] {
            assert_eq!(outcome.status(step), Some(StepStatus::Simulated), "{}", step);
        }
        assert_eq!(outcome.archive.as_deref(), Some(fx.archive("a").as_path()));
    }

    #[test]
    fn test_empty_run() {
        let fx = Fixture::new(&[]);
        let summary = fx.run(
            &FakeStack::default(),
            &FakeVolumes::default(),
            &FakeTransfer::default(),
        );
        assert_eq!(summary.succeeded(), 0);
        assert_eq!(summary.exit_code(), 0);
    }
}
