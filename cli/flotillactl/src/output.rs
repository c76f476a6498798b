//! Output formatting for CLI commands.

use colored::Colorize;
use flotilla_fleet::{Fleet, FleetConfig, Node};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// One row of `show-machines` output.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct MachineRow {
    #[tabled(rename = "Role")]
    pub role: String,

    #[tabled(rename = "Name")]
    pub name: String,

    #[tabled(rename = "ID")]
    pub id: String,

    #[tabled(rename = "Address")]
    pub addr: String,
}

impl MachineRow {
    fn new(role: &str, node: &Node) -> Self {
        Self {
            role: role.to_string(),
            name: node.name.clone(),
            id: node.id.to_string(),
            addr: node.addr.clone(),
        }
    }
}

/// Flatten a fleet into display rows, coordinator first.
pub fn machine_rows(fleet: &Fleet) -> Vec<MachineRow> {
    let mut rows = Vec::new();
    if let Some(coordinator) = &fleet.coordinator {
        rows.push(MachineRow::new("coordinator", coordinator));
    }
    for (_, worker) in &fleet.workers {
        rows.push(MachineRow::new("worker", worker));
    }
    rows
}

/// Print rows in the requested format.
pub fn print_machines(rows: &[MachineRow], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("{}", "No machines found.".dimmed());
            } else {
                println!("{}", Table::new(rows));
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
    }
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print a login hint for the coordinator.
pub fn print_login_hint(config: &FleetConfig, coordinator: &Node) {
    let identity = config
        .ssh
        .identity_file
        .as_ref()
        .map(|path| format!(" -i {}", path))
        .unwrap_or_default();
    println!(
        "\nConnect: {}",
        format!("ssh{} {}@{}", identity, config.ssh.user, coordinator.addr).cyan()
    );
}
