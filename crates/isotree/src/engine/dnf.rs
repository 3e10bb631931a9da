use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::engine::{InstalledPackage, PackageCatalog, PackageEngine, PackageRef};
use crate::error::{Error, Result};
use crate::log::BuildLog;
use crate::process;

/// A repository passed to dnf with `--repofrompath`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub id: String,
    pub url: String,
}

impl Repo {
    /// Repos given on the command line get positional ids (`isotree-0`, ...).
    pub fn numbered(index: usize, url: impl Into<String>) -> Self {
        Self {
            id: format!("isotree-{index}"),
            url: url.into(),
        }
    }
}

/// Package engine backed by the host's `dnf` and `rpm`, operating on an
/// alternate install root.
pub struct DnfEngine {
    install_root: PathBuf,
    release_ver: String,
    repos: Vec<Repo>,
    packages: Vec<String>,
    skip_broken: bool,
    search_path: Option<String>,
    log: Arc<BuildLog>,
}

impl DnfEngine {
    pub fn new(
        install_root: impl Into<PathBuf>,
        release_ver: impl Into<String>,
        repos: Vec<Repo>,
        packages: Vec<String>,
        log: Arc<BuildLog>,
    ) -> Self {
        Self {
            install_root: install_root.into(),
            release_ver: release_ver.into(),
            repos,
            packages,
            skip_broken: false,
            search_path: None,
            log,
        }
    }

    /// PATH handed to every spawned dnf/rpm process.
    pub fn with_search_path(mut self, search_path: impl Into<String>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        if let Some(p) = &self.search_path {
            cmd.env("PATH", p);
        }
        cmd
    }

    fn dnf(&self) -> Command {
        let mut cmd = self.command("dnf");
        cmd.arg("-y")
            .arg(format!("--installroot={}", self.install_root.display()))
            .arg(format!("--releasever={}", self.release_ver));
        if !self.repos.is_empty() {
            cmd.arg("--disablerepo=*");
            for r in &self.repos {
                cmd.arg(format!("--repofrompath={},{}", r.id, r.url));
                cmd.arg(format!("--enablerepo={}", r.id));
            }
        }
        cmd
    }

    fn rpm(&self) -> Command {
        let mut cmd = self.command("rpm");
        cmd.arg("--root").arg(&self.install_root);
        cmd
    }
}

impl PackageCatalog for DnfEngine {
    fn list_available(&self, pattern: &str) -> Result<Vec<PackageRef>> {
        let mut cmd = self.dnf();
        cmd.args([
            "repoquery",
            "--available",
            "--queryformat",
            "%{name} %{arch}\\n",
            pattern,
        ]);
        let out = process::capture(&self.log, cmd)?;
        Ok(parse_name_arch(&out))
    }
}

impl PackageEngine for DnfEngine {
    fn install_root(&self) -> &Path {
        &self.install_root
    }

    fn set_install_root(&mut self, root: PathBuf) {
        self.install_root = root;
    }

    fn set_skip_broken(&mut self, skip: bool) {
        self.skip_broken = skip;
    }

    fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        let mut cmd = self.rpm();
        cmd.args(["-qa", "--queryformat", "[%{NAME}\\t%{FILENAMES}\\n]"]);
        let out = process::capture(&self.log, cmd)?;
        Ok(parse_file_lists(&out))
    }

    fn install(&mut self) -> Result<()> {
        if self.packages.is_empty() {
            return Err(Error::msg("no packages selected for installation"));
        }
        let mut cmd = self.dnf();
        if self.skip_broken {
            cmd.arg("--skip-broken");
        }
        cmd.arg("install").args(&self.packages);
        process::run_logged(&self.log, cmd)
    }

    fn required_tools(&self) -> Vec<String> {
        vec!["dnf".into(), "rpm".into()]
    }
}

fn parse_name_arch(raw: &str) -> Vec<PackageRef> {
    raw.lines()
        .filter_map(|line| {
            let mut it = line.split_whitespace();
            let name = it.next()?;
            let arch = it.next()?;
            Some(PackageRef::new(name, arch))
        })
        .collect()
}

// rpm prints one `name\tpath` line per file; packages without files print
// `name\t(none)` or just the name.
fn parse_file_lists(raw: &str) -> Vec<InstalledPackage> {
    let mut by_name: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for line in raw.lines() {
        let (name, path) = match line.split_once('\t') {
            Some((n, p)) => (n.trim(), p.trim()),
            None => (line.trim(), ""),
        };
        if name.is_empty() {
            continue;
        }
        let files = by_name.entry(name.to_string()).or_default();
        if !path.is_empty() && path != "(none)" {
            files.push(PathBuf::from(path));
        }
    }
    by_name
        .into_iter()
        .map(|(name, files)| InstalledPackage { name, files })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemorySink;

    #[test]
    fn parses_repoquery_output() {
        let got = parse_name_arch("anaconda src\nanaconda x86_64\n\nbroken\n");
        assert_eq!(
            got,
            vec![
                PackageRef::new("anaconda", "src"),
                PackageRef::new("anaconda", "x86_64"),
            ]
        );
    }

    #[test]
    fn groups_file_lists_by_package() {
        let raw = "bash\t/usr/bin/bash\nbash\t/usr/bin/sh\nfilesystem\t(none)\nsetup\t/etc/passwd\n";
        let got = parse_file_lists(raw);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].name, "bash");
        assert_eq!(
            got[0].files,
            vec![PathBuf::from("/usr/bin/bash"), PathBuf::from("/usr/bin/sh")]
        );
        assert!(got[1].files.is_empty());
    }

    #[test]
    fn dnf_command_carries_root_release_and_repos() {
        let log = Arc::new(BuildLog::new(MemorySink::default()));
        let engine = DnfEngine::new(
            "/var/tmp/engine",
            "42",
            vec![Repo::numbered(0, "https://mirror.example/os")],
            vec!["kernel".into()],
            log,
        );
        let desc = process::describe(&engine.dnf());
        assert!(desc.contains("--installroot=/var/tmp/engine"), "{desc}");
        assert!(desc.contains("--releasever=42"), "{desc}");
        assert!(
            desc.contains("--repofrompath=isotree-0,https://mirror.example/os"),
            "{desc}"
        );
    }

    #[test]
    fn install_without_packages_fails() {
        let log = Arc::new(BuildLog::new(MemorySink::default()));
        let mut engine = DnfEngine::new("/var/tmp/engine", "42", Vec::new(), Vec::new(), log);
        assert!(engine.install().is_err());
    }
}
