//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::{ChangeAction, ChangePlan, OutcomeStatus, RunSummary};
use crate::state::DeploymentState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan entry row for table display.
#[derive(Tabled)]
struct PlanEntryRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Run outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Error")]
    error: String,
}

/// Recorded resource row for table display.
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Depends on")]
    dependencies: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when rendering JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Formats a change plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ChangePlan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &ChangePlan, detailed: bool) -> String {
        if !plan.has_changes() {
            return format!(
                "{} No changes. {} resources are up to date.\n",
                "✓".green(),
                plan.unchanged()
            );
        }

        let mut output = String::new();

        let _ = writeln!(output, "\nChange plan for {}", plan.deployment);
        let _ = write!(output, "   Config hash: {}\n\n", short(&plan.config_hash));

        let rows: Vec<PlanEntryRow> = plan
            .entries
            .iter()
            .filter(|e| detailed || !e.action.is_noop())
            .enumerate()
            .map(|(i, e)| PlanEntryRow {
                index: i + 1,
                action: Self::format_action(&e.action),
                resource: e.name.clone(),
                resource_type: e.resource_type.clone(),
                details: Self::plan_details(&e.action, &e.dependencies, detailed),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged",
            plan.creates().to_string().green(),
            plan.updates().to_string().yellow(),
            plan.deletes().to_string().red(),
            plan.unchanged()
        );

        output
    }

    fn plan_details(action: &ChangeAction, dependencies: &[String], detailed: bool) -> String {
        let mut details = Vec::new();
        if !action.changed_fields().is_empty() {
            details.push(format!("changed: {}", action.changed_fields().join(", ")));
        }
        if detailed && !dependencies.is_empty() {
            details.push(format!("after: {}", dependencies.join(", ")));
        }
        truncate(&details.join("; "), 60)
    }

    /// Formats a run summary.
    #[must_use]
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Text => Self::format_summary_text(summary),
        }
    }

    fn format_summary_text(summary: &RunSummary) -> String {
        let mut output = String::new();

        let headline = if summary.success() {
            format!("{} Run {} complete", "✓".green(), summary.run_id)
        } else {
            format!("{} Run {} incomplete", "✗".red(), summary.run_id)
        };
        let _ = write!(output, "\n{headline}\n\n");

        let rows: Vec<OutcomeRow> = summary
            .outcomes
            .iter()
            .filter(|o| o.status != OutcomeStatus::Unchanged)
            .map(|o| OutcomeRow {
                resource: o.name.clone(),
                action: Self::format_action(&o.action),
                status: Self::format_status(o.status),
                attempts: o.attempts,
                error: truncate(o.error.as_deref().unwrap_or(""), 60),
            })
            .collect();

        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let totals = &summary.totals;
        let _ = writeln!(
            output,
            "\nApplied: {} created, {} updated, {} deleted, {} unchanged",
            totals.created.to_string().green(),
            totals.updated.to_string().yellow(),
            totals.deleted.to_string().red(),
            totals.unchanged
        );
        if !summary.success() {
            let _ = writeln!(
                output,
                "Not applied: {} failed, {} skipped, {} cancelled",
                totals.failed.to_string().red(),
                totals.skipped,
                totals.cancelled
            );
        }

        if !summary.outputs.is_empty() {
            output.push_str("\nOutputs:\n");
            output.push_str(&Self::outputs_text(&summary.outputs));
        }

        output
    }

    /// Formats stack outputs.
    #[must_use]
    pub fn format_outputs(&self, outputs: &BTreeMap<String, Value>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outputs).unwrap_or_default(),
            OutputFormat::Text if outputs.is_empty() => String::from("No outputs recorded.\n"),
            OutputFormat::Text => Self::outputs_text(outputs),
        }
    }

    fn outputs_text(outputs: &BTreeMap<String, Value>) -> String {
        let mut output = String::new();
        for (name, value) in outputs {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = writeln!(output, "   {} = {rendered}", name.bold());
        }
        output
    }

    /// Formats deployment state.
    #[must_use]
    pub fn format_state(&self, state: &DeploymentState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(output, "\nState: {}\n\n", state.deployment);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Serial: {}", state.serial);
                let _ = writeln!(output, "   Config hash: {}", short(&state.config_hash));
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}\n", state.resources.len());

                if !state.resources.is_empty() {
                    let rows: Vec<RecordRow> = state
                        .resources
                        .values()
                        .map(|r| RecordRow {
                            name: r.name.clone(),
                            resource_type: r.resource_type.clone(),
                            id: r
                                .outputs
                                .get("id")
                                .and_then(Value::as_str)
                                .unwrap_or("-")
                                .to_string(),
                            dependencies: r.dependencies.join(", "),
                            updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                        })
                        .collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    output.push_str(&Self::history_text(state, 5));
                }

                output
            }
        }
    }

    /// Formats the most recent runs.
    #[must_use]
    pub fn format_history(&self, state: &DeploymentState, limit: usize) -> String {
        match self.format {
            OutputFormat::Json => {
                let recent: Vec<_> = state.history.iter().rev().take(limit).collect();
                serde_json::to_string_pretty(&recent).unwrap_or_default()
            }
            OutputFormat::Text if state.history.is_empty() => String::from("No runs recorded.\n"),
            OutputFormat::Text => Self::history_text(state, limit),
        }
    }

    fn history_text(state: &DeploymentState, limit: usize) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "\n   Recent runs ({}):", state.history.len());
        for entry in state.history.iter().rev().take(limit) {
            let status = if entry.success { "✓".green() } else { "✗".red() };
            let changed = if entry.changed.is_empty() {
                String::from("no changes")
            } else {
                entry.changed.join(", ")
            };
            let _ = writeln!(
                output,
                "     {status} {} - {} ({changed})",
                entry.timestamp.format("%Y-%m-%d %H:%M"),
                entry.operation
            );
            if entry.failed > 0 || entry.not_attempted > 0 {
                let _ = writeln!(
                    output,
                    "         {} failed, {} not attempted",
                    entry.failed, entry.not_attempted
                );
            }
        }
        output
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "valid": result.is_valid(),
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    let mut text = format!(
                        "{} Configuration has {} errors:\n",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(text, "   - {error}");
                    }
                    text
                };

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a change action with color.
    fn format_action(action: &ChangeAction) -> String {
        match action {
            ChangeAction::Create => "+create".green().to_string(),
            ChangeAction::Update { .. } => "~update".yellow().to_string(),
            ChangeAction::Delete => "-delete".red().to_string(),
            ChangeAction::NoOp => "noop".dimmed().to_string(),
        }
    }

    /// Formats an outcome status with color.
    fn format_status(status: OutcomeStatus) -> String {
        match status {
            OutcomeStatus::Applied => "applied".green().to_string(),
            OutcomeStatus::Unchanged => "unchanged".dimmed().to_string(),
            OutcomeStatus::Failed => "failed".red().to_string(),
            OutcomeStatus::Skipped => "skipped".yellow().to_string(),
            OutcomeStatus::Cancelled => "cancelled".yellow().to_string(),
        }
    }
}

/// First eight characters of a hash.
fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ChangeEntry;
    use crate::state::DeploymentId;

    fn plan(actions: Vec<(&str, ChangeAction)>) -> ChangePlan {
        let entries = actions
            .into_iter()
            .map(|(name, action)| ChangeEntry {
                name: name.to_string(),
                resource_type: String::from("storage:bucket"),
                action,
                dependencies: vec![],
            })
            .collect();
        ChangePlan::new(DeploymentId::new("demo", "dev"), String::from("0123456789abcdef"), entries)
    }

    #[test]
    fn test_text_plan_lists_changes() {
        colored::control::set_override(false);
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_plan(
            &plan(vec![
                ("bucket1", ChangeAction::Update { changed: vec![String::from("acl")] }),
                ("bucket2", ChangeAction::Create),
                ("bucket3", ChangeAction::NoOp),
            ]),
            false,
        );

        assert!(text.contains("bucket1"));
        assert!(text.contains("changed: acl"));
        assert!(!text.contains("bucket3"));
        assert!(text.contains("01234567"));
    }

    #[test]
    fn test_text_plan_without_changes() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_plan(&plan(vec![("bucket1", ChangeAction::NoOp)]), false);
        assert!(text.contains("No changes"));
    }

    #[test]
    fn test_json_plan_is_machine_readable() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let text = formatter.format_plan(&plan(vec![("bucket2", ChangeAction::Delete)]), false);
        let json: Value = serde_json::from_str(&text).expect("json");

        assert_eq!(json["entries"][0]["action"], "delete");
        assert_eq!(json["deployment"]["project"], "demo");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
        assert_eq!(short("abc"), "abc");
    }
}
