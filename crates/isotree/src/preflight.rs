//! Host checks that must pass before a build touches the filesystem.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::host::Host;
use crate::log::BuildLog;

pub fn check_privileges(host: &dyn Host, log: &BuildLog) -> Result<()> {
    if host.is_privileged() {
        return Ok(());
    }
    log.critical("you need to be root to run this");
    Err(Error::precondition("insufficient privileges: effective uid is not 0"))
}

/// Tools from `tools` that cannot be resolved on `search_path`, in input order.
pub fn missing_tools(host: &dyn Host, tools: &[String], search_path: &str) -> Vec<String> {
    tools
        .iter()
        .filter(|t| host.find_tool(t, search_path).is_none())
        .cloned()
        .collect()
}

pub fn check_tools(host: &dyn Host, tools: &[String], search_path: &str, log: &BuildLog) -> Result<()> {
    let missing = missing_tools(host, tools, search_path);
    if missing.is_empty() {
        log.debug(format!("required tools present: {}", tools.join(", ")));
        return Ok(());
    }
    let msg = format!("required tools not found on PATH: {}", missing.join(", "));
    log.critical(msg.clone());
    Err(Error::precondition(msg))
}

/// Trim, sort and drop duplicates.
pub fn dedup_tools<I: IntoIterator<Item = String>>(tools: I) -> Vec<String> {
    let mut out: Vec<String> = tools
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub path: Option<PathBuf>,
}

/// Snapshot of the host for `isotree check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub privileged: bool,
    pub machine: Option<String>,
    pub search_path: String,
    pub tools: Vec<ToolStatus>,
}

impl Report {
    pub fn collect(host: &dyn Host, tools: &[String], search_path: &str) -> Self {
        Self {
            privileged: host.is_privileged(),
            machine: host.machine(),
            search_path: search_path.to_string(),
            tools: tools
                .iter()
                .map(|t| ToolStatus {
                    name: t.clone(),
                    path: host.find_tool(t, search_path),
                })
                .collect(),
        }
    }

    pub fn ok(&self) -> bool {
        self.privileged && self.machine.is_some() && self.tools.iter().all(|t| t.path.is_some())
    }
}
