use std::process::Command;

/// Run an external tool to completion and turn anything but a clean exit
/// into a message fit for an error variant.
pub fn run_tool(command: &mut Command) -> Result<(), String> {
    let program = command.get_program().to_string_lossy().into_owned();
    log::debug!("Running {:?}", command);

    let output = command
        .output()
        .map_err(|e| format!("failed to execute {program}: {e}"))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Err(format!("{program} exited with {}", output.status))
    } else {
        Err(stderr.to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_success() {
        assert!(run_tool(&mut Command::new("true")).is_ok());
    }

    #[test]
    fn test_stderr_is_reported() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'bad input' >&2; exit 3"]);
        assert_eq!(run_tool(&mut cmd).unwrap_err(), "bad input");
    }

    #[test]
    fn test_exit_status_without_stderr() {
        let err = run_tool(&mut Command::new("false")).unwrap_err();
        assert!(err.starts_with("false exited with"), "{err}");
    }

    #[test]
    fn test_missing_program() {
        let err = run_tool(&mut Command::new("definitely-not-installed-tool")).unwrap_err();
        assert!(err.contains("failed to execute definitely-not-installed-tool"));
    }
}
