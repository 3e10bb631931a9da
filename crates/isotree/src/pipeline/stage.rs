use std::time::Instant;

use serde::Serialize;

use crate::error::{ErrorKind, Result};
use crate::log::{BuildEvent, BuildLog};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Privileges,
    Workspace,
    Tools,
    Engine,
    InstallRoot,
    Arch,
    Context,
    Packages,
    BuildStamp,
    PkgLists,
    PostInstall,
    DiscInfo,
    Backup,
    Clean,
    Runtime,
    Tree,
    TreeInfo,
}

impl Stage {
    pub const ALL: [Stage; 17] = [
        Stage::Privileges,
        Stage::Workspace,
        Stage::Tools,
        Stage::Engine,
        Stage::InstallRoot,
        Stage::Arch,
        Stage::Context,
        Stage::Packages,
        Stage::BuildStamp,
        Stage::PkgLists,
        Stage::PostInstall,
        Stage::DiscInfo,
        Stage::Backup,
        Stage::Clean,
        Stage::Runtime,
        Stage::Tree,
        Stage::TreeInfo,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Stage::Privileges => "preflight.privileges",
            Stage::Workspace => "workspace.init",
            Stage::Tools => "preflight.tools",
            Stage::Engine => "engine.validate",
            Stage::InstallRoot => "installroot.prepare",
            Stage::Arch => "arch.resolve",
            Stage::Context => "context.assemble",
            Stage::Packages => "packages.install",
            Stage::BuildStamp => "metadata.buildstamp",
            Stage::PkgLists => "pkglists.snapshot",
            Stage::PostInstall => "runtime.postinstall",
            Stage::DiscInfo => "metadata.discinfo",
            Stage::Backup => "installroot.backup",
            Stage::Clean => "runtime.clean",
            Stage::Runtime => "runtime.create",
            Stage::Tree => "tree.build",
            Stage::TreeInfo => "metadata.treeinfo",
        }
    }

    /// Console progress line; internal bookkeeping stages have none.
    pub fn label(self) -> Option<&'static str> {
        match self {
            Stage::Privileges | Stage::Tools | Stage::Engine | Stage::Context => None,
            Stage::Workspace => Some("setting up build environment"),
            Stage::InstallRoot => Some("preparing install root"),
            Stage::Arch => Some("resolving build architecture"),
            Stage::Packages => Some("installing runtime packages"),
            Stage::BuildStamp => Some("writing .buildstamp"),
            Stage::PkgLists => Some("recording installed package lists"),
            Stage::PostInstall => Some("running runtime post-install"),
            Stage::DiscInfo => Some("writing .discinfo"),
            Stage::Backup => Some("backing up install root"),
            Stage::Clean => Some("cleaning runtime"),
            Stage::Runtime => Some("creating runtime image"),
            Stage::Tree => Some("building boot images"),
            Stage::TreeInfo => Some("writing .treeinfo"),
        }
    }

    /// Stages that hand control to an injected collaborator.
    pub fn is_collaborator(self) -> bool {
        matches!(
            self,
            Stage::Packages
                | Stage::BuildStamp
                | Stage::PkgLists
                | Stage::PostInstall
                | Stage::DiscInfo
                | Stage::Clean
                | Stage::Runtime
                | Stage::Tree
                | Stage::TreeInfo
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub id: &'static str,
    pub elapsed_ms: u128,
}

/// Run one stage with start/finish events and timing. Errors are tagged with
/// the stage id.
pub(crate) fn run_stage<T>(
    log: &BuildLog,
    reports: &mut Vec<StageReport>,
    stage: Stage,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let id = stage.id();
    log.emit(BuildEvent::StageStarted { id });
    if let Some(label) = stage.label() {
        log.info(label);
    }
    let start = Instant::now();
    let res = f();
    let elapsed_ms = start.elapsed().as_millis();
    match res {
        Ok(v) => {
            log.emit(BuildEvent::StageFinished {
                id,
                ok: true,
                error: None,
                elapsed_ms,
            });
            reports.push(StageReport { id, elapsed_ms });
            Ok(v)
        }
        Err(e) => {
            log.emit(BuildEvent::StageFinished {
                id,
                ok: false,
                error: Some(e.to_string()),
                elapsed_ms,
            });
            let e = e.in_stage(id, stage.is_collaborator());
            if e.kind() == ErrorKind::Collaborator {
                log.critical(e.to_string());
            }
            Err(e)
        }
    }
}
