use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::arch::ArchitectureInfo;
use crate::builders::TreeBuilder;
use crate::config::Compression;
use crate::error::{Error, Result};
use crate::fsutil;
use crate::log::BuildLog;
use crate::metadata::Sections;
use crate::process;

pub const PXEBOOT_DIR: &str = "images/pxeboot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    pub version: String,
    pub vmlinuz: PathBuf,
    pub initrd: PathBuf,
}

/// Find installed kernels as `boot/vmlinuz-<version>`, oldest first.
/// Rescue kernels are skipped.
pub fn find_kernels(root: &Path) -> Result<Vec<Kernel>> {
    let boot = root.join("boot");
    let rd = fs::read_dir(&boot)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", boot.display())))?;
    let mut out = Vec::new();
    for entry in rd {
        let entry = entry.map_err(|e| Error::msg(format!("failed to read {}: {e}", boot.display())))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(version) = name.strip_prefix("vmlinuz-") else {
            continue;
        };
        if version.is_empty() || version.contains("rescue") {
            continue;
        }
        out.push(Kernel {
            version: version.to_string(),
            vmlinuz: boot.join(&name),
            initrd: boot.join(format!("initramfs-{version}.img")),
        });
    }
    out.sort_by(|a, b| compare_versions(&a.version, &b.version));
    Ok(out)
}

/// Compare kernel versions piece by piece on `.` and `-`. Numeric pieces
/// compare as integers, so `6.10.0` sorts after `6.9.1`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split(['.', '-']);
    let mut right = b.split(['.', '-']);
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// Extra dracut arguments from the ramdisk template: whitespace separated,
/// `#` starts a comment. A missing template contributes nothing.
pub fn template_args(template: &Path) -> Result<Vec<String>> {
    if !template.is_file() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(template)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", template.display())))?;
    Ok(raw
        .lines()
        .map(|l| l.split('#').next().unwrap_or_default())
        .flat_map(str::split_whitespace)
        .map(ToOwned::to_owned)
        .collect())
}

pub struct DracutTreeBuilder {
    arch: ArchitectureInfo,
    root: PathBuf,
    output_dir: PathBuf,
    ramdisk_template: PathBuf,
    compression: Compression,
    log: Arc<BuildLog>,
    search_path: String,
    treeinfo: Sections,
}

impl DracutTreeBuilder {
    pub fn new(
        arch: ArchitectureInfo,
        root: &Path,
        output_dir: &Path,
        ramdisk_template: PathBuf,
        compression: Compression,
        log: Arc<BuildLog>,
        search_path: impl Into<String>,
    ) -> Self {
        Self {
            arch,
            root: root.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            ramdisk_template,
            compression,
            log,
            search_path: search_path.into(),
            treeinfo: Sections::new(),
        }
    }

    fn kernels(&self) -> Result<Vec<Kernel>> {
        let kernels = find_kernels(&self.root)?;
        if kernels.is_empty() {
            return Err(Error::msg(format!(
                "no kernels found under {}",
                self.root.join("boot").display()
            )));
        }
        Ok(kernels)
    }

    fn dracut_command(&self, kernel: &Kernel, args: &[&str], extra: &[String]) -> Command {
        let mut cmd = Command::new("chroot");
        cmd.env("PATH", &self.search_path)
            .arg(&self.root)
            .arg("dracut")
            .args(args)
            .args(extra)
            .args(["--force", "--kver", kernel.version.as_str()])
            .arg(format!("/boot/initramfs-{}.img", kernel.version));
        cmd
    }

    fn compressor_command(&self) -> Command {
        let mut cmd = Command::new(&self.compression.kind);
        cmd.env("PATH", &self.search_path)
            .args(compressor_args(&self.compression));
        cmd
    }

    // cpio | compressor > archive
    fn write_runtime_archive(&self, runtime_dir: &Path, archive: &Path) -> Result<()> {
        let mut list = String::new();
        for entry in walkdir::WalkDir::new(runtime_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
            let rel = entry
                .path()
                .strip_prefix(runtime_dir)
                .map_err(|e| Error::msg(format!("strip_prefix failed: {e}")))?;
            if rel.as_os_str().is_empty() {
                continue;
            }
            list.push_str(&rel.to_string_lossy());
            list.push('\n');
        }

        let out = File::create(archive)
            .map_err(|e| Error::msg(format!("failed to create {}: {e}", archive.display())))?;
        let mut cpio = Command::new("cpio")
            .env("PATH", &self.search_path)
            .args(["--quiet", "-H", "newc", "-o"])
            .current_dir(runtime_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Error::msg(format!("failed to spawn cpio: {e}")))?;
        let cpio_out = cpio
            .stdout
            .take()
            .ok_or_else(|| Error::msg("cpio stdout unavailable"))?;
        let mut compress = self
            .compressor_command()
            .stdin(Stdio::from(cpio_out))
            .stdout(Stdio::from(out))
            .spawn()
            .map_err(|e| Error::msg(format!("failed to spawn {}: {e}", self.compression.kind)))?;

        if let Some(mut stdin) = cpio.stdin.take() {
            io::Write::write_all(&mut stdin, list.as_bytes())
                .map_err(|e| Error::msg(format!("failed to feed cpio: {e}")))?;
        }

        let cpio_status = cpio
            .wait()
            .map_err(|e| Error::msg(format!("wait failed for cpio: {e}")))?;
        let compress_status = compress
            .wait()
            .map_err(|e| Error::msg(format!("wait failed for {}: {e}", self.compression.kind)))?;
        if !cpio_status.success() {
            return Err(Error::msg(format!("cpio failed: {cpio_status}")));
        }
        if !compress_status.success() {
            return Err(Error::msg(format!(
                "{} failed: {compress_status}",
                self.compression.kind
            )));
        }
        Ok(())
    }
}

fn compressor_args(c: &Compression) -> Vec<String> {
    let level = format!("-{}", c.speed.max(1));
    match c.kind.as_str() {
        // The kernel only unpacks crc32-checked xz.
        "xz" => vec![level, "--check=crc32".into(), "-c".into()],
        "zstd" => vec![level, "-q".into(), "-c".into()],
        _ => vec![level, "-c".into()],
    }
}

impl TreeBuilder for DracutTreeBuilder {
    fn rebuild_initrds(&mut self, args: &[&str]) -> Result<()> {
        let extra = template_args(&self.ramdisk_template)?;
        for kernel in self.kernels()? {
            self.log
                .debug(format!("rebuilding initrd for kernel {}", kernel.version));
            process::run_logged(&self.log, self.dracut_command(&kernel, args, &extra))?;
        }
        Ok(())
    }

    fn initrd_append(&mut self, runtime_dir: &Path) -> Result<()> {
        if !runtime_dir.is_dir() {
            return Err(Error::msg(format!(
                "runtime dir {} does not exist",
                runtime_dir.display()
            )));
        }
        let archive = runtime_dir.with_extension(format!("cpio.{}", self.compression.kind));
        self.write_runtime_archive(runtime_dir, &archive)?;

        for kernel in self.kernels()? {
            let mut src = File::open(&archive)
                .map_err(|e| Error::msg(format!("failed to open {}: {e}", archive.display())))?;
            let mut dst = OpenOptions::new()
                .append(true)
                .open(&kernel.initrd)
                .map_err(|e| {
                    Error::msg(format!("failed to open {}: {e}", kernel.initrd.display()))
                })?;
            let n = io::copy(&mut src, &mut dst).map_err(|e| {
                Error::msg(format!("failed to append to {}: {e}", kernel.initrd.display()))
            })?;
            self.log.debug(format!(
                "appended {n} bytes of runtime to {}",
                kernel.initrd.display()
            ));
        }
        Ok(())
    }

    fn build(&mut self) -> Result<()> {
        let kernels = self.kernels()?;
        let pxe = self.output_dir.join(PXEBOOT_DIR);
        fsutil::ensure_dir(&pxe)?;

        let mut images = BTreeMap::new();
        // The newest kernel is the default boot entry; older ones keep their version suffix.
        let newest = kernels.len() - 1;
        for (i, kernel) in kernels.iter().enumerate() {
            let (vmlinuz, initrd) = if i == newest {
                ("vmlinuz".to_string(), "initrd.img".to_string())
            } else {
                (
                    format!("vmlinuz-{}", kernel.version),
                    format!("initrd-{}.img", kernel.version),
                )
            };
            fsutil::copy_file(&kernel.vmlinuz, &pxe.join(&vmlinuz))?;
            fsutil::copy_file(&kernel.initrd, &pxe.join(&initrd))?;
            if i == newest {
                images.insert("kernel".to_string(), format!("{PXEBOOT_DIR}/{vmlinuz}"));
                images.insert("initrd".to_string(), format!("{PXEBOOT_DIR}/{initrd}"));
            }
        }

        self.treeinfo
            .insert(format!("images-{}", self.arch.base_arch), images);
        Ok(())
    }

    fn treeinfo_data(&self) -> &Sections {
        &self.treeinfo
    }
}
