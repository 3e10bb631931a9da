use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use isotree::builders::{BuilderFactory, DefaultBuilders};
use isotree::config::{self, Config, DEFAULT_CONFIG_PATH};
use isotree::context::ProductInfo;
use isotree::engine::PackageEngine;
use isotree::engine::dnf::{DnfEngine, Repo};
use isotree::host::SystemHost;
use isotree::log::BuildLog;
use isotree::pipeline::{Orchestrator, RunOptions};
use isotree::workspace::EngineRoot;
use isotree::{ErrorKind, Result, arch, preflight};

const DEFAULT_PACKAGES: &[&str] = &["anaconda", "kernel", "dracut"];

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Log at debug level regardless of the config file
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Default, Args)]
struct RepoArgs {
    /// Package repository URL (repeatable); defaults to the host's repos
    #[arg(short, long = "source")]
    sources: Vec<String>,
    /// Release version handed to dnf
    #[arg(long, default_value = "")]
    releasever: String,
    /// Directory the engine installs into (default: a fresh temp dir)
    #[arg(long)]
    engine_root: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compose an installation tree
    Build {
        #[arg(short, long)]
        product: String,
        #[arg(short = 'v', long = "version")]
        product_version: String,
        #[arg(short, long)]
        release: String,
        #[arg(long, default_value = "")]
        variant: String,
        #[arg(long, default_value = "your distribution provided bug reporting tool")]
        bugurl: String,
        #[arg(long)]
        isbeta: bool,
        /// Tree-relative package directory recorded in `.treeinfo`
        #[arg(long, default_value = "")]
        packagedir: String,
        /// Packages to install into the runtime (repeatable)
        #[arg(long = "package")]
        packages: Vec<String>,
        #[arg(long)]
        workdir: Option<PathBuf>,
        #[arg(long)]
        outputdir: Option<PathBuf>,
        /// Override `[packages] skip_broken`
        #[arg(long)]
        skip_broken: bool,
        #[command(flatten)]
        repos: RepoArgs,
    },
    /// Print the build architecture the catalog resolves to
    Arch {
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        repos: RepoArgs,
    },
    /// Report privileges and required tools without building
    Check {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut builder = config::load(&cli.config)?;
    if cli.debug {
        builder = builder.debug(true);
    }
    if let Command::Build {
        skip_broken: true, ..
    } = &cli.cmd
    {
        builder = builder.skip_broken(true);
    }
    let cfg = builder.build()?;

    let default_level = if cfg.debug() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_ansi(cfg.colors())
        .without_time()
        .init();

    let res = match cli.cmd {
        Command::Build {
            product,
            product_version,
            release,
            variant,
            bugurl,
            isbeta,
            packagedir,
            packages,
            workdir,
            outputdir,
            skip_broken: _,
            repos,
        } => {
            let info = ProductInfo::new(product, &product_version, release)
                .with_variant(variant)
                .with_bug_url(bugurl)
                .with_package_dir(packagedir)
                .beta(isbeta);
            let opts = RunOptions {
                work_dir: workdir,
                output_dir: outputdir,
            };
            cmd_build(cfg, info, packages, repos, &opts)
        }
        Command::Arch { json, repos } => cmd_arch(&cfg, &repos, json),
        Command::Check { json } => cmd_check(&cfg, json),
    };

    match res {
        Err(e) if e.kind() == ErrorKind::Precondition => {
            tracing::debug!("{e}");
            std::process::exit(1);
        }
        other => other,
    }
}

fn dnf_engine(
    root: &Path,
    repos: &RepoArgs,
    packages: Vec<String>,
    log: &Arc<BuildLog>,
    search_path: String,
) -> DnfEngine {
    let list = repos
        .sources
        .iter()
        .enumerate()
        .map(|(i, url)| Repo::numbered(i, url.as_str()))
        .collect();
    DnfEngine::new(root, &repos.releasever, list, packages, Arc::clone(log))
        .with_search_path(search_path)
}

fn cmd_build(
    cfg: Config,
    product: ProductInfo,
    packages: Vec<String>,
    repos: RepoArgs,
    opts: &RunOptions,
) -> Result<()> {
    let log = Arc::new(BuildLog::tracing());
    let search_path = cfg.search_path();
    let packages = if packages.is_empty() {
        DEFAULT_PACKAGES.iter().map(|s| s.to_string()).collect()
    } else {
        packages
    };
    let mut repos = repos;
    if repos.releasever.is_empty() {
        repos.releasever = product.version.clone();
    }

    // The install tree stays behind for inspection, like the work dir.
    let root = EngineRoot::new(repos.engine_root.as_deref())?.keep();
    let mut engine = dnf_engine(&root, &repos, packages, &log, search_path.clone());

    let builders = DefaultBuilders::new(Arc::clone(&log), search_path);
    let mut orch = Orchestrator::new(Arc::clone(&log), Box::new(SystemHost), Box::new(builders));
    orch.configure(cfg)?;
    let outcome = orch.run(&mut engine, product, opts)?;

    println!("output: {}", outcome.context.output_dir().display());
    println!("runtime image: {}", outcome.runtime_image.display());
    if let Some(file) = log.file_path() {
        println!("log: {}", file.display());
    }
    for st in &outcome.stages {
        println!("{:<22} {:>8} ms", st.id, st.elapsed_ms);
    }
    Ok(())
}

fn cmd_arch(cfg: &Config, repos: &RepoArgs, json: bool) -> Result<()> {
    let log = Arc::new(BuildLog::tracing());
    // Only the catalog is queried; a temporary root goes away with `root`.
    let root = EngineRoot::new(repos.engine_root.as_deref())?;
    let engine = dnf_engine(root.path(), repos, Vec::new(), &log, cfg.search_path());

    let Some(info) = arch::resolve(&engine, &SystemHost, &log) else {
        log.critical("unable to determine build architecture");
        return Err(isotree::Error::precondition("unable to determine build architecture"));
    };
    if json {
        let s = serde_json::to_string_pretty(&info)
            .map_err(|e| isotree::Error::msg(format!("json encode failed: {e}")))?;
        println!("{s}");
    } else {
        println!("buildarch: {}", info.build_arch);
        println!("basearch:  {}", info.base_arch);
        println!("libdir:    {}", info.lib_dir);
    }
    Ok(())
}

fn cmd_check(cfg: &Config, json: bool) -> Result<()> {
    let log = Arc::new(BuildLog::tracing());
    let search_path = cfg.search_path();
    let engine = dnf_engine(Path::new("/"), &RepoArgs::default(), Vec::new(), &log, search_path.clone());
    let builders = DefaultBuilders::new(Arc::clone(&log), search_path.clone());
    let tools = preflight::dedup_tools(
        engine
            .required_tools()
            .into_iter()
            .chain(builders.required_tools(cfg)),
    );
    let report = preflight::Report::collect(&SystemHost, &tools, &search_path);

    if json {
        let s = serde_json::to_string_pretty(&report)
            .map_err(|e| isotree::Error::msg(format!("json encode failed: {e}")))?;
        println!("{s}");
    } else {
        println!("privileged: {}", report.privileged);
        println!("machine:    {}", report.machine.as_deref().unwrap_or("unknown"));
        for t in &report.tools {
            match &t.path {
                Some(p) => println!("  ok       {:<12} {}", t.name, p.display()),
                None => println!("  missing  {}", t.name),
            }
        }
    }
    if !report.ok() {
        return Err(isotree::Error::precondition("host is not ready to build"));
    }
    Ok(())
}
