//! Error display for the CLI.

use colored::Colorize;
use flotilla_fleet::FleetError;

/// Print an error in a user-friendly format, with a hint where one helps.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(fleet_err) = err.downcast_ref::<FleetError>() {
        match fleet_err {
            FleetError::NoCoordinator => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `flotilla create-cluster <workers>` first.".yellow()
                );
            }
            FleetError::CoordinatorExists => {
                eprintln!(
                    "\n{}",
                    "Hint: The cluster is already up. Use `flotilla add-workers` to grow it."
                        .yellow()
                );
            }
            FleetError::Provision { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Nodes provisioned so far are still running; `flotilla show-machines` \
                     lists them, `flotilla destroy-cluster` cleans up."
                        .yellow()
                );
            }
            FleetError::TerminationTimeout { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: The provider is slow confirming terminations. Check the listed \
                     instances in the provider console before retrying."
                        .yellow()
                );
            }
            _ => {}
        }
    }
}
