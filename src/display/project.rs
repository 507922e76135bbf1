//! Project display formatting
//!
//! Formats discovered projects and run results for terminal output.

use crate::backup::{RunSummary, StepStatus};
use crate::discovery::Project;

/// Format discovered projects as a table
pub fn format_project_list(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "No projects found.".to_string();
    }

    // Calculate column widths
    let name_width = projects
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(7)
        .max(7);

    let file_width = projects
        .iter()
        .map(|p| file_name(p).len())
        .max()
        .unwrap_or(15)
        .max(15);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<name_width$}  {:<file_width$}  {}\n",
        "Project",
        "Definition file",
        "Directory",
        name_width = name_width,
        file_width = file_width,
    ));

    output.push_str(&format!(
        "{:-<name_width$}  {:-<file_width$}  {:-<9}\n",
        "",
        "",
        "",
        name_width = name_width,
        file_width = file_width,
    ));

    for project in projects {
        output.push_str(&format!(
            "{:<name_width$}  {:<file_width$}  {}\n",
            project.name,
            file_name(project),
            project.definition_dir.display(),
            name_width = name_width,
            file_width = file_width,
        ));
    }

    output.push_str(&format!("\n{} project(s)\n", projects.len()));
    output
}

/// One line per project plus totals
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut output = String::new();

    for outcome in &summary.outcomes {
        let status = if outcome.failed {
            let step = outcome
                .steps
                .iter()
                .find(|r| r.status == StepStatus::Failed)
                .map(|r| r.step.to_string())
                .unwrap_or_default();
            format!("FAILED at {}", step)
        } else if outcome
            .steps
            .iter()
            .any(|r| r.status == StepStatus::Degraded)
        {
            "OK (without appdata)".to_string()
        } else {
            "OK".to_string()
        };
        output.push_str(&format!("  {:<24} {}\n", outcome.project, status));
    }

    output.push_str(&format!(
        "{} succeeded, {} failed\n",
        summary.succeeded(),
        summary.failed()
    ));
    output
}

fn file_name(project: &Project) -> String {
    project
        .definition_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
