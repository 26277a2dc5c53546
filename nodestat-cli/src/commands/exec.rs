//! Raw remote command execution.

use nodestat_core::Node;

use crate::error::CliError;

/// Runs `command` on the host and prints its trimmed stdout
pub async fn cmd_exec(node: &Node, command: &str) -> Result<(), CliError> {
    let output = node.exec(command)?.await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
