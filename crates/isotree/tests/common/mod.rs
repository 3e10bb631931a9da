#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use isotree::builders::{BuilderFactory, RuntimeBuilder, TreeBuilder};
use isotree::config::Config;
use isotree::context::{BuildContext, ProductInfo};
use isotree::engine::{Capability, InstalledPackage, PackageCatalog, PackageEngine, PackageRef};
use isotree::host::Host;
use isotree::log::{BuildLog, MemorySink};
use isotree::metadata::Sections;
use isotree::pipeline::{Orchestrator, RunOptions};
use isotree::{Error, Result};

/// Ordered record of every collaborator call, shared by all fakes of one test.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }

    pub fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("journal has no '{entry}': {:?}", self.entries()))
    }
}

pub struct FakeHost {
    pub privileged: bool,
    pub machine: Option<String>,
    pub missing: Vec<String>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            privileged: true,
            machine: Some("x86_64".into()),
            missing: Vec::new(),
        }
    }
}

impl Host for FakeHost {
    fn is_privileged(&self) -> bool {
        self.privileged
    }

    fn machine(&self) -> Option<String> {
        self.machine.clone()
    }

    fn find_tool(&self, name: &str, _search_path: &str) -> Option<PathBuf> {
        if self.missing.iter().any(|m| m == name) {
            None
        } else {
            Some(PathBuf::from("/usr/bin").join(name))
        }
    }
}

pub struct FakeEngine {
    pub root: PathBuf,
    pub available: Vec<PackageRef>,
    pub installed: Vec<InstalledPackage>,
    pub caps: Vec<Capability>,
    pub catalog_fails: bool,
    pub skip_broken: Option<bool>,
    pub journal: Journal,
}

impl FakeEngine {
    pub fn new(root: &Path, journal: &Journal) -> Self {
        Self {
            root: root.to_path_buf(),
            available: vec![PackageRef::new("anaconda", "x86_64")],
            installed: vec![
                InstalledPackage {
                    name: "bash".into(),
                    files: vec!["/usr/bin/bash".into(), "/usr/bin/sh".into()],
                },
                InstalledPackage {
                    name: "kernel".into(),
                    files: vec!["/boot/vmlinuz-6.9.1".into()],
                },
            ],
            caps: vec![
                Capability::Catalog,
                Capability::InstalledList,
                Capability::Install,
            ],
            catalog_fails: false,
            skip_broken: None,
            journal: journal.clone(),
        }
    }
}

impl PackageCatalog for FakeEngine {
    fn list_available(&self, pattern: &str) -> Result<Vec<PackageRef>> {
        self.journal.record(format!("engine.list_available {pattern}"));
        if self.catalog_fails {
            return Err(Error::msg("repoquery failed"));
        }
        Ok(self
            .available
            .iter()
            .filter(|p| p.name == pattern)
            .cloned()
            .collect())
    }
}

impl PackageEngine for FakeEngine {
    fn install_root(&self) -> &Path {
        &self.root
    }

    fn set_install_root(&mut self, root: PathBuf) {
        self.journal.record("engine.set_install_root");
        self.root = root;
    }

    fn set_skip_broken(&mut self, skip: bool) {
        self.skip_broken = Some(skip);
    }

    fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        self.journal.record("engine.list_installed");
        Ok(self.installed.clone())
    }

    fn install(&mut self) -> Result<()> {
        self.journal.record("engine.install");
        fs::create_dir_all(self.root.join("boot"))?;
        fs::create_dir_all(self.root.join("var/cache/dnf"))?;
        fs::write(self.root.join("boot/vmlinuz-6.9.1"), "kernel")?;
        fs::write(self.root.join("var/cache/dnf/metadata"), "cache")?;
        Ok(())
    }

    fn capabilities(&self) -> &[Capability] {
        &self.caps
    }

    fn required_tools(&self) -> Vec<String> {
        vec!["fake-dnf".into()]
    }
}

#[derive(Clone, Default)]
pub struct FakeBuilders {
    pub journal: Journal,
    pub fail_runtime: bool,
}

impl BuilderFactory for FakeBuilders {
    fn runtime_builder(&self, ctx: &BuildContext, _cfg: &Config) -> Result<Box<dyn RuntimeBuilder>> {
        Ok(Box::new(FakeRuntime {
            root: ctx.install_root().to_path_buf(),
            fail: self.fail_runtime,
            journal: self.journal.clone(),
        }))
    }

    fn tree_builder(
        &self,
        ctx: &BuildContext,
        _cfg: &Config,
        root: &Path,
        output_dir: &Path,
    ) -> Result<Box<dyn TreeBuilder>> {
        self.journal
            .record(format!("tree.root {}", root.display()));
        Ok(Box::new(FakeTree {
            base_arch: ctx.arch().base_arch.clone(),
            output_dir: output_dir.to_path_buf(),
            sections: Sections::new(),
            journal: self.journal.clone(),
        }))
    }

    fn required_tools(&self, _cfg: &Config) -> Vec<String> {
        vec!["fake-mksquashfs".into(), "fake-dnf".into()]
    }
}

pub struct FakeRuntime {
    root: PathBuf,
    fail: bool,
    journal: Journal,
}

impl RuntimeBuilder for FakeRuntime {
    fn install(&mut self, engine: &mut dyn PackageEngine) -> Result<()> {
        self.journal.record("runtime.install");
        engine.install()
    }

    fn postinstall(&mut self) -> Result<()> {
        self.journal.record("runtime.postinstall");
        fs::create_dir_all(self.root.join("etc"))?;
        fs::write(self.root.join("etc/postinstalled"), "yes")?;
        Ok(())
    }

    fn clean(&mut self) -> Result<()> {
        self.journal.record("runtime.clean");
        let cache = self.root.join("var/cache/dnf");
        if cache.exists() {
            fs::remove_dir_all(cache)?;
        }
        Ok(())
    }

    fn create_runtime(&mut self, dir: &Path) -> Result<PathBuf> {
        self.journal.record("runtime.create");
        if self.fail {
            return Err(Error::msg("mksquashfs failed: exit status: 1"));
        }
        fs::create_dir_all(dir)?;
        let image = dir.join("squashfs.img");
        fs::write(&image, "image")?;
        Ok(image)
    }
}

pub struct FakeTree {
    base_arch: String,
    output_dir: PathBuf,
    sections: Sections,
    journal: Journal,
}

impl TreeBuilder for FakeTree {
    fn rebuild_initrds(&mut self, args: &[&str]) -> Result<()> {
        self.journal
            .record(format!("tree.rebuild_initrds {}", args.join(" ")));
        Ok(())
    }

    fn initrd_append(&mut self, runtime_dir: &Path) -> Result<()> {
        self.journal
            .record(format!("tree.initrd_append {}", runtime_dir.display()));
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        self.journal.record("tree.build");
        let treeinfo = if self.output_dir.join(".treeinfo").exists() {
            "present"
        } else {
            "absent"
        };
        self.journal.record(format!("tree.build treeinfo={treeinfo}"));
        let pxe = self.output_dir.join("images/pxeboot");
        fs::create_dir_all(&pxe)?;
        fs::write(pxe.join("vmlinuz"), "kernel")?;
        let mut images = BTreeMap::new();
        images.insert("kernel".to_string(), "images/pxeboot/vmlinuz".to_string());
        self.sections
            .insert(format!("images-{}", self.base_arch), images);
        Ok(())
    }

    fn treeinfo_data(&self) -> &Sections {
        &self.sections
    }
}

/// Per-test sandbox: work/output dirs are paths under `tmp` that do not exist yet.
pub struct Sandbox {
    pub tmp: tempfile::TempDir,
    pub sink: Arc<MemorySink>,
    pub log: Arc<BuildLog>,
    pub journal: Journal,
}

impl Sandbox {
    pub fn new() -> Self {
        let sink = Arc::new(MemorySink::default());
        Self {
            tmp: tempfile::tempdir().expect("tempdir"),
            log: Arc::new(BuildLog::new(Arc::clone(&sink))),
            sink,
            journal: Journal::default(),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.path("work")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path("out")
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            work_dir: Some(self.work_dir()),
            output_dir: Some(self.output_dir()),
        }
    }

    pub fn config(&self) -> Config {
        Config::builder()
            .sharedir(self.path("share"))
            .ignorelist(self.path("ignore"))
            .build()
            .expect("config")
    }

    pub fn engine(&self) -> FakeEngine {
        FakeEngine::new(&self.path("engine"), &self.journal)
    }

    pub fn builders(&self) -> FakeBuilders {
        FakeBuilders {
            journal: self.journal.clone(),
            fail_runtime: false,
        }
    }

    pub fn orchestrator(&self, host: FakeHost, builders: FakeBuilders) -> Orchestrator {
        Orchestrator::new(Arc::clone(&self.log), Box::new(host), Box::new(builders))
    }

    pub fn configured(&self, host: FakeHost, builders: FakeBuilders) -> Orchestrator {
        let mut orch = self.orchestrator(host, builders);
        orch.configure(self.config()).expect("configure");
        orch
    }
}

pub fn product() -> ProductInfo {
    ProductInfo::new("Fedora", "42", "42")
        .with_variant("Server")
        .with_bug_url("https://bugzilla.redhat.com")
        .with_package_dir("Packages")
}
