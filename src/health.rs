//! Environment diagnostics for `gdocs-sync health`.

use std::fmt;
use std::time::Duration;

use crate::bridge::{self, AuthStatus, DataDirReply, DocsRequest};
use crate::credentials::credentials_path;
use crate::ipc::{RpcClient, WorkerLocator};

/// Worker round-trips slower than this are reported as a warning.
const SLOW_PING: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl CheckStatus {
    fn label(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: &'static str,
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub checks: Vec<Check>,
}

impl HealthReport {
    /// True when no check failed. Warnings do not count.
    pub fn is_healthy(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    fn push(&mut self, check: Check) {
        self.checks.push(check);
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            writeln!(f, "[{:<4}] {:<14} {}", check.status.label(), check.name, check.detail)?;
        }
        Ok(())
    }
}

/// Run every check in order, stopping early when the worker cannot be
/// reached since the remaining checks depend on it.
pub async fn run(client: &RpcClient, locator: &WorkerLocator) -> HealthReport {
    let mut report = HealthReport::default();

    match locator.resolve() {
        Ok(command) => report.push(Check::new("worker", CheckStatus::Ok, command.display())),
        Err(e) => {
            report.push(Check::new("worker", CheckStatus::Fail, e.to_string()));
            return report;
        }
    }

    if let Err(e) = client.ensure_worker_running() {
        report.push(Check::new("launch", CheckStatus::Fail, e.to_string()));
        return report;
    }
    report.push(Check::new("launch", CheckStatus::Ok, client.worker_state().as_str()));

    match client.ping().await {
        Ok(latency) => {
            let status = if latency > SLOW_PING {
                CheckStatus::Warn
            } else {
                CheckStatus::Ok
            };
            report.push(Check::new("ping", status, format!("{} ms", latency.as_millis())));
        }
        Err(e) => {
            report.push(Check::new("ping", CheckStatus::Fail, e.to_string()));
            return report;
        }
    }

    match bridge::call_sync::<DataDirReply>(client, DocsRequest::DataDir).await {
        Ok(reply) => {
            report.push(Check::new("data dir", CheckStatus::Ok, reply.path.display().to_string()));
            let credentials = credentials_path(&reply.path);
            if credentials.is_file() {
                report.push(Check::new(
                    "credentials",
                    CheckStatus::Ok,
                    credentials.display().to_string(),
                ));
            } else {
                report.push(Check::new(
                    "credentials",
                    CheckStatus::Warn,
                    format!(
                        "{} missing; run `gdocs-sync install-credentials <file>`",
                        credentials.display()
                    ),
                ));
            }
        }
        Err(e) => report.push(Check::new("data dir", CheckStatus::Warn, e.to_string())),
    }

    match bridge::call_sync::<AuthStatus>(client, DocsRequest::IsAuthenticated).await {
        Ok(AuthStatus { authenticated: true }) => {
            report.push(Check::new("auth", CheckStatus::Ok, "authenticated"))
        }
        Ok(_) => report.push(Check::new(
            "auth",
            CheckStatus::Warn,
            "not authenticated; run `gdocs-sync auth`",
        )),
        Err(e) => report.push(Check::new("auth", CheckStatus::Fail, e.to_string())),
    }

    report
}
