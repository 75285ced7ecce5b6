//! Worker process location and lifecycle state.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::info;

use crate::ipc::client::RpcError;

/// File name of the bundled worker script.
pub const WORKER_SCRIPT_NAME: &str = "gdocs_server.py";

/// Lifecycle of the worker process.
///
/// `NotStarted` → `Running` on a successful launch; `Running` → `Stopped`
/// when the process exits or is stopped. A later call restarts it, moving
/// `Stopped` → `Running` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    #[default]
    NotStarted,
    Running {
        pid: Option<u32>,
    },
    /// `exit_code` is `None` when the process was killed or the code is
    /// unavailable.
    Stopped {
        exit_code: Option<i32>,
    },
}

impl WorkerState {
    pub fn is_running(&self) -> bool {
        matches!(self, WorkerState::Running { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::NotStarted => "not started",
            WorkerState::Running { .. } => "running",
            WorkerState::Stopped { .. } => "stopped",
        }
    }
}

/// How to launch the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    /// Launch `script` with `python` when it is a `.py` file, directly otherwise.
    pub fn for_script(script: &Path, python: &str) -> Self {
        let is_python = script.extension().and_then(|e| e.to_str()) == Some("py");

        if is_python {
            Self {
                program: python.into(),
                args: vec!["-u".into(), script.as_os_str().to_owned()],
            }
        } else {
            Self {
                program: script.as_os_str().to_owned(),
                args: Vec::new(),
            }
        }
    }

    /// Build a `tokio` command with piped stdio.
    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Display form for logs and health output.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Where to look for the worker script, in priority order.
#[derive(Debug, Clone, Default)]
pub struct WorkerLocator {
    /// Explicit override (from configuration).
    pub override_path: Option<PathBuf>,
    /// Interpreter for `.py` scripts.
    pub python: String,
}

impl WorkerLocator {
    pub fn new(override_path: Option<PathBuf>, python: impl Into<String>) -> Self {
        Self {
            override_path,
            python: python.into(),
        }
    }

    /// Candidate script paths in lookup order.
    ///
    /// 1. The configured override
    /// 2. `python/gdocs_server.py` under the current directory
    /// 3. `python/gdocs_server.py` next to the executable or up to four parents
    /// 4. `<data dir>/gdocs-sync/gdocs_server.py`
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(path) = &self.override_path {
            candidates.push(path.clone());
        }

        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join("python").join(WORKER_SCRIPT_NAME));
        }

        if let Ok(exe) = std::env::current_exe() {
            let mut dir = exe.parent();
            for _ in 0..5 {
                let Some(d) = dir else { break };
                candidates.push(d.join("python").join(WORKER_SCRIPT_NAME));
                dir = d.parent();
            }
        }

        if let Some(data_dir) = dirs::data_dir() {
            candidates.push(data_dir.join("gdocs-sync").join(WORKER_SCRIPT_NAME));
        }

        candidates
    }

    /// Resolve the first existing candidate into a launch command.
    ///
    /// An override that does not exist is an error rather than falling
    /// through, so a typo in the configuration is not silently ignored.
    pub fn resolve(&self) -> Result<WorkerCommand, RpcError> {
        if let Some(path) = &self.override_path {
            if !path.exists() {
                return Err(RpcError::WorkerNotFound(path.display().to_string()));
            }
            info!("Using worker from configuration: {}", path.display());
            return Ok(WorkerCommand::for_script(path, &self.python));
        }

        self.candidates()
            .into_iter()
            .find(|p| p.is_file())
            .map(|p| {
                info!("Found worker script: {}", p.display());
                WorkerCommand::for_script(&p, &self.python)
            })
            .ok_or_else(|| RpcError::WorkerNotFound(WORKER_SCRIPT_NAME.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_python_script_runs_unbuffered_under_interpreter() {
        let cmd = WorkerCommand::for_script(Path::new("/opt/w/gdocs_server.py"), "python3");
        assert_eq!(cmd.program, OsString::from("python3"));
        assert_eq!(
            cmd.args,
            vec![OsString::from("-u"), OsString::from("/opt/w/gdocs_server.py")]
        );
        assert_eq!(cmd.display(), "python3 -u /opt/w/gdocs_server.py");
    }

    #[test]
    fn test_executable_runs_directly() {
        let cmd = WorkerCommand::for_script(Path::new("/usr/local/bin/gdocs-worker"), "python3");
        assert_eq!(cmd.program, OsString::from("/usr/local/bin/gdocs-worker"));
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn test_missing_override_is_not_found() {
        let locator = WorkerLocator::new(
            Some(PathBuf::from("/nonexistent/gdocs-sync-test/worker.py")),
            "python3",
        );
        let err = locator.resolve().unwrap_err();
        assert!(matches!(err, RpcError::WorkerNotFound(_)));
        assert!(err.to_string().contains("/nonexistent/gdocs-sync-test/worker.py"));
    }

    #[test]
    fn test_override_is_first_candidate() {
        let locator = WorkerLocator::new(Some(PathBuf::from("/tmp/custom.py")), "python3");
        assert_eq!(locator.candidates()[0], PathBuf::from("/tmp/custom.py"));
    }

    #[test]
    fn test_worker_state_labels() {
        assert_eq!(WorkerState::default(), WorkerState::NotStarted);
        assert!(WorkerState::Running { pid: Some(1) }.is_running());
        assert!(!WorkerState::Stopped { exit_code: Some(1) }.is_running());
        assert_eq!(WorkerState::Stopped { exit_code: None }.as_str(), "stopped");
    }
}
