use serde::Serialize;

use crate::engine::PackageCatalog;
use crate::host::Host;
use crate::log::BuildLog;

/// Package whose available build tells us the target architecture.
pub const ARCH_INDICATOR_PACKAGE: &str = "anaconda";

/// Pseudo-architecture of source packages; never a build target.
pub const SOURCE_ARCH: &str = "src";

const LIB64_ARCHES: &[&str] = &["x86_64", "ppc64", "sparc64", "s390x", "ia64"];

const ARCH_FAMILIES: &[(&str, &str)] = &[
    ("i386", "i386"),
    ("i586", "i386"),
    ("i686", "i386"),
    ("x86_64", "x86_64"),
    ("ppc", "ppc"),
    ("ppc64", "ppc"),
    ("sparc", "sparc"),
    ("sparcv9", "sparc"),
    ("sparc64", "sparc"),
    ("s390", "s390"),
    ("s390x", "s390x"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchitectureInfo {
    pub build_arch: String,
    pub base_arch: String,
    pub lib_dir: String,
}

impl ArchitectureInfo {
    pub fn new(build_arch: impl Into<String>) -> Self {
        let build_arch = build_arch.into();
        Self {
            base_arch: base_arch(&build_arch).to_string(),
            lib_dir: lib_dir(&build_arch).to_string(),
            build_arch,
        }
    }
}

pub fn base_arch(build_arch: &str) -> &str {
    ARCH_FAMILIES
        .iter()
        .find(|(arch, _)| *arch == build_arch)
        .map(|(_, family)| *family)
        .unwrap_or(build_arch)
}

pub fn lib_dir(build_arch: &str) -> &'static str {
    if LIB64_ARCHES.contains(&build_arch) {
        "lib64"
    } else {
        "lib"
    }
}

/// Determine the build architecture from the catalog, falling back to the
/// host. Never fails: returns `None` only when neither source has an answer.
pub fn resolve<C: PackageCatalog + ?Sized>(
    catalog: &C,
    host: &dyn Host,
    log: &BuildLog,
) -> Option<ArchitectureInfo> {
    let available = match catalog.list_available(ARCH_INDICATOR_PACKAGE) {
        Ok(pkgs) => pkgs,
        Err(e) => {
            log.debug(format!("catalog query for '{ARCH_INDICATOR_PACKAGE}' failed: {e}"));
            Vec::new()
        }
    };

    let from_catalog = available
        .iter()
        .map(|p| p.arch.trim())
        .find(|arch| !arch.is_empty() && *arch != SOURCE_ARCH);

    let build_arch = match from_catalog {
        Some(arch) => arch.to_string(),
        None => {
            log.warning("using system architecture");
            host.machine()?
        }
    };

    let info = ArchitectureInfo::new(build_arch);
    log.debug(format!("arch.build_arch = {}", info.build_arch));
    log.debug(format!("arch.base_arch = {}", info.base_arch));
    log.debug(format!("arch.lib_dir = {}", info.lib_dir));
    Some(info)
}
