use crate::models::AdminCommand;
use log::{info, warn};
use std::io::BufRead;
use tokio::sync::mpsc;

/// Parses one operator command, e.g. `{"command":"tighten_limit", ...}`.
pub fn parse_command(line: &str) -> Result<AdminCommand, serde_json::Error> {
    serde_json::from_str(line.trim())
}

/// Reads JSON commands from stdin, one per line, on a detached thread.
pub fn spawn_stdin_commands(tx: mpsc::Sender<AdminCommand>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(command) => {
                    info!("Received command {:?}", command);
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring malformed command {:?}: {}", line, e),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading::{ComponentId, RiskMetric, RiskScope};

    #[test]
    fn parses_operator_commands() {
        assert_eq!(parse_command(r#"{"command":"shutdown"}"#).unwrap(), AdminCommand::Shutdown);
        assert_eq!(
            parse_command(r#"{"command":"recover","component":"execution_adapter"}"#).unwrap(),
            AdminCommand::Recover {
                component: ComponentId::ExecutionAdapter
            }
        );
        assert_eq!(
            parse_command(
                r#"{"command":"tighten_limit","scope":"global","metric":"max_position","threshold":50.0}"#
            )
            .unwrap(),
            AdminCommand::TightenLimit {
                scope: RiskScope::Global,
                metric: RiskMetric::MaxPosition,
                threshold: 50.0
            }
        );
        assert!(parse_command("restart everything").is_err());
    }
}
