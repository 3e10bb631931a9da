//! Build pipeline orchestrator.
//!
//! An [`Orchestrator`] is configured once and runs once. `run` walks the
//! fixed [`Stage`] sequence, stopping at the first failure. Nothing is rolled
//! back: the work directory keeps whatever the failed stage left behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::arch;
use crate::builders::{BuilderFactory, TreeBuilder};
use crate::config::Config;
use crate::context::{BuildContext, ProductInfo};
use crate::engine::{InstalledPackage, PackageEngine};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::host::Host;
use crate::log::{BuildEvent, BuildLog};
use crate::log_sanitize::OutputFilter;
use crate::metadata::{
    BUILDSTAMP_FILE, BuildStamp, DISCINFO_FILE, DiscInfo, TREEINFO_FILE, TreeInfo,
};
use crate::preflight;
use crate::workspace;

mod stage;

pub use stage::{Stage, StageReport};
use stage::run_stage;

/// Initrd rebuild arguments passed to the tree builder.
pub const INITRD_ARGS: &[&str] = &["--xz"];
pub const INSTALL_ROOT_DIR: &str = "installroot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unconfigured,
    Configured,
    Running,
    Succeeded,
    Failed,
}

/// Where to put the run's directories. `None` means a fresh temporary directory.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub work_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub context: BuildContext,
    pub backup_root: PathBuf,
    pub runtime_dir: PathBuf,
    pub runtime_image: PathBuf,
    pub stages: Vec<StageReport>,
}

pub struct Orchestrator {
    log: Arc<BuildLog>,
    host: Box<dyn Host>,
    builders: Box<dyn BuilderFactory>,
    state: State,
    config: Option<Config>,
    search_path: String,
}

impl Orchestrator {
    pub fn new(log: Arc<BuildLog>, host: Box<dyn Host>, builders: Box<dyn BuilderFactory>) -> Self {
        Self {
            log,
            host,
            builders,
            state: State::Unconfigured,
            config: None,
            search_path: String::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn log(&self) -> &Arc<BuildLog> {
        &self.log
    }

    /// Accept the run's tunables. Must be called exactly once, before `run`.
    pub fn configure(&mut self, config: Config) -> Result<()> {
        if self.state != State::Unconfigured {
            return Err(Error::contract(format!(
                "configure() called in state {:?}; it may only be called once",
                self.state
            )));
        }
        config.validate()?;

        let filter = OutputFilter::load(config.ignorelist())?;
        if !filter.is_empty() {
            self.log.debug(format!(
                "loaded {} output ignore patterns from {}",
                filter.len(),
                config.ignorelist().display()
            ));
        }
        self.log.set_filter(filter);

        self.search_path = config.search_path();
        self.log.debug(format!("sharedir = {}", config.sharedir().display()));
        self.log.debug(format!(
            "compression = {} (speed {})",
            config.compression().kind,
            config.compression().speed
        ));
        self.log.debug(format!("search path = {}", self.search_path));

        self.config = Some(config);
        self.state = State::Configured;
        Ok(())
    }

    /// Run every stage in order against `engine`.
    pub fn run(
        &mut self,
        engine: &mut dyn PackageEngine,
        product: ProductInfo,
        opts: &RunOptions,
    ) -> Result<RunOutcome> {
        if self.state != State::Configured {
            return Err(Error::contract(format!(
                "run() called in state {:?}; configure() must be called exactly once first",
                self.state
            )));
        }
        let Some(cfg) = self.config.clone() else {
            return Err(Error::contract("run() called without a configuration"));
        };

        self.state = State::Running;
        self.log.debug(format!(
            "building {} {} (release {})",
            product.name, product.version, product.release
        ));
        let res = self.run_stages(engine, &product, opts, &cfg);
        match &res {
            Ok(_) => {
                self.state = State::Succeeded;
                self.log.emit(BuildEvent::RunDone {
                    ok: true,
                    error: None,
                });
            }
            Err(e) => {
                self.state = State::Failed;
                self.log.emit(BuildEvent::RunDone {
                    ok: false,
                    error: Some(e.to_string()),
                });
            }
        }
        res
    }

    fn run_stages(
        &self,
        engine: &mut dyn PackageEngine,
        product: &ProductInfo,
        opts: &RunOptions,
        cfg: &Config,
    ) -> Result<RunOutcome> {
        let log = self.log.as_ref();
        let host = self.host.as_ref();
        let mut reports = Vec::new();

        run_stage(log, &mut reports, Stage::Privileges, || {
            preflight::check_privileges(host, log)
        })?;

        let paths = run_stage(log, &mut reports, Stage::Workspace, || {
            let paths =
                workspace::init_dirs(opts.work_dir.as_deref(), opts.output_dir.as_deref())?;
            let file = log.attach_file(&paths.log_dir)?;
            log.debug(format!("work dir = {}", paths.work_dir.display()));
            log.debug(format!("output dir = {}", paths.output_dir.display()));
            log.debug(format!("log file = {}", file.display()));
            Ok(paths)
        })?;

        run_stage(log, &mut reports, Stage::Tools, || {
            let tools = preflight::dedup_tools(
                engine
                    .required_tools()
                    .into_iter()
                    .chain(self.builders.required_tools(cfg)),
            );
            preflight::check_tools(host, &tools, &self.search_path, log)
        })?;

        run_stage(log, &mut reports, Stage::Engine, || {
            crate::engine::validate(&*engine).inspect_err(|e| log.critical(e.to_string()))
        })?;

        let install_root = run_stage(log, &mut reports, Stage::InstallRoot, || {
            let root = engine.install_root().join(INSTALL_ROOT_DIR);
            // The backup stage clears its target before linking into it.
            let backup = paths.backup_root();
            if fsutil::paths_overlap(&root, &backup)? {
                let msg = format!(
                    "install root {} overlaps the backup root {}; use an engine root outside the work dir",
                    root.display(),
                    backup.display()
                );
                log.critical(&msg);
                return Err(Error::precondition(msg));
            }
            fsutil::ensure_dir(&root)?;
            engine.set_install_root(root.clone());
            log.debug(format!("install root = {}", root.display()));
            Ok(root)
        })?;

        let arch = run_stage(log, &mut reports, Stage::Arch, || {
            arch::resolve(&*engine, host, log).ok_or_else(|| {
                let msg = "unable to determine build architecture";
                log.critical(msg);
                Error::precondition(msg)
            })
        })?;

        let ctx = run_stage(log, &mut reports, Stage::Context, || {
            Ok(BuildContext::new(
                product.clone(),
                arch,
                paths.work_dir.clone(),
                paths.log_dir.clone(),
                paths.output_dir.clone(),
                install_root.clone(),
            ))
        })?;

        let mut runtime = run_stage(log, &mut reports, Stage::Packages, || {
            engine.set_skip_broken(cfg.skip_broken());
            let mut rb = self.builders.runtime_builder(&ctx, cfg)?;
            rb.install(&mut *engine)?;
            Ok(rb)
        })?;

        run_stage(log, &mut reports, Stage::BuildStamp, || {
            BuildStamp::new(
                &product.name,
                &product.version,
                &product.bug_url,
                product.is_beta,
                &ctx.arch().build_arch,
            )
            .write(&install_root.join(BUILDSTAMP_FILE))
        })?;

        run_stage(log, &mut reports, Stage::PkgLists, || {
            let pkgs = engine.list_installed()?;
            let n = write_pkglists(&paths.pkglists_dir(), &pkgs)?;
            log.debug(format!("wrote {n} package lists"));
            Ok(())
        })?;

        run_stage(log, &mut reports, Stage::PostInstall, || runtime.postinstall())?;

        run_stage(log, &mut reports, Stage::DiscInfo, || {
            DiscInfo::new(&product.release, &ctx.arch().base_arch)
                .write(&paths.output_dir.join(DISCINFO_FILE))
        })?;

        let backup_root = run_stage(log, &mut reports, Stage::Backup, || {
            let backup = paths.backup_root();
            fsutil::remove_path_if_exists(&backup)?;
            let n = fsutil::link_tree(&install_root, &backup)?;
            log.debug(format!("linked {n} files into {}", backup.display()));
            Ok(backup)
        })?;

        run_stage(log, &mut reports, Stage::Clean, || runtime.clean())?;

        let runtime_dir = paths.runtime_dir();
        let runtime_image = run_stage(log, &mut reports, Stage::Runtime, || {
            runtime.create_runtime(&runtime_dir)
        })?;

        let tree = run_stage(log, &mut reports, Stage::Tree, || {
            let mut tb = self
                .builders
                .tree_builder(&ctx, cfg, &backup_root, &paths.output_dir)?;
            tb.rebuild_initrds(INITRD_ARGS)?;
            tb.initrd_append(&runtime_dir)?;
            tb.build()?;
            Ok(tb)
        })?;

        run_stage(log, &mut reports, Stage::TreeInfo, || {
            write_treeinfo(&ctx, &*tree)
        })?;

        Ok(RunOutcome {
            context: ctx,
            backup_root,
            runtime_dir,
            runtime_image,
            stages: reports,
        })
    }
}

/// One file per package under `dir`, listing the package's files one per line.
pub fn write_pkglists(dir: &Path, pkgs: &[InstalledPackage]) -> Result<usize> {
    fsutil::ensure_dir(dir)?;
    for pkg in pkgs {
        if pkg.name.is_empty() || pkg.name.contains('/') || pkg.name == "." || pkg.name == ".." {
            return Err(Error::msg(format!("invalid package name '{}'", pkg.name)));
        }
        let mut body = String::new();
        for f in &pkg.files {
            body.push_str(&f.to_string_lossy());
            body.push('\n');
        }
        fsutil::write_text(&dir.join(&pkg.name), &body)?;
    }
    Ok(pkgs.len())
}

fn write_treeinfo(ctx: &BuildContext, tree: &dyn TreeBuilder) -> Result<()> {
    let product = ctx.product();
    let mut info = TreeInfo::new(
        &product.name,
        &product.version,
        &product.variant,
        &ctx.arch().base_arch,
        &product.package_dir,
    );
    for (section, data) in tree.treeinfo_data() {
        info.add_section(section, data)?;
    }
    info.write(&ctx.output_dir().join(TREEINFO_FILE))
}
