use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/isotree/isotree.toml";
pub const DEFAULT_SHAREDIR: &str = "/usr/share/isotree";

const SUPPORTED_COMPRESSION: &[&str] = &["xz", "gzip", "zstd"];
const EXTRA_SEARCH_DIRS: &[&str] = &["/sbin", "/usr/sbin"];

fn default_true() -> bool {
    true
}

fn default_sharedir() -> String {
    DEFAULT_SHAREDIR.into()
}

fn default_encoding() -> String {
    "utf-8".into()
}

fn default_ignorelist() -> String {
    format!("{DEFAULT_SHAREDIR}/ignorelist")
}

fn default_ramdisk() -> String {
    "ramdisk.tmpl".into()
}

fn default_compression_type() -> String {
    "xz".into()
}

fn default_compression_speed() -> u32 {
    9
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    isotree: GeneralSection,
    output: OutputSection,
    templates: TemplatesSection,
    packages: PackagesSection,
    compression: CompressionSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GeneralSection {
    #[serde(default = "default_true")]
    debug: bool,
    #[serde(default = "default_sharedir")]
    sharedir: String,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            debug: true,
            sharedir: default_sharedir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OutputSection {
    #[serde(default = "default_true")]
    colors: bool,
    #[serde(default = "default_encoding")]
    encoding: String,
    #[serde(default = "default_ignorelist")]
    ignorelist: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            colors: true,
            encoding: default_encoding(),
            ignorelist: default_ignorelist(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TemplatesSection {
    #[serde(default = "default_ramdisk")]
    ramdisk: String,
}

impl Default for TemplatesSection {
    fn default() -> Self {
        Self {
            ramdisk: default_ramdisk(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PackagesSection {
    skip_broken: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CompressionSection {
    #[serde(rename = "type", default = "default_compression_type")]
    kind: String,
    #[serde(default = "default_compression_speed")]
    speed: u32,
}

impl Default for CompressionSection {
    fn default() -> Self {
        Self {
            kind: default_compression_type(),
            speed: default_compression_speed(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compression {
    pub kind: String,
    pub speed: u32,
}

/// Build tunables. Assembled once through [`ConfigBuilder`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    debug: bool,
    sharedir: PathBuf,
    colors: bool,
    encoding: String,
    ignorelist: PathBuf,
    ramdisk_template: String,
    skip_broken: bool,
    compression: Compression,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Template root handed to the runtime and tree builders.
    pub fn sharedir(&self) -> &Path {
        &self.sharedir
    }

    pub fn colors(&self) -> bool {
        self.colors
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn ignorelist(&self) -> &Path {
        &self.ignorelist
    }

    pub fn ramdisk_template(&self) -> PathBuf {
        self.sharedir.join(&self.ramdisk_template)
    }

    pub fn skip_broken(&self) -> bool {
        self.skip_broken
    }

    pub fn compression(&self) -> &Compression {
        &self.compression
    }

    /// `$PATH` with the sbin directories appended; non-login environments
    /// (cron, sudo with a reset env) often lack them.
    pub fn search_path(&self) -> String {
        let mut parts: Vec<String> = std::env::var("PATH")
            .unwrap_or_default()
            .split(':')
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        for dir in EXTRA_SEARCH_DIRS {
            if !parts.iter().any(|p| p == dir) {
                parts.push((*dir).to_string());
            }
        }
        parts.join(":")
    }
}

impl Default for Config {
    fn default() -> Self {
        let file = FileConfig::default();
        Self {
            debug: file.isotree.debug,
            sharedir: PathBuf::from(file.isotree.sharedir),
            colors: file.output.colors,
            encoding: file.output.encoding,
            ignorelist: PathBuf::from(file.output.ignorelist),
            ramdisk_template: file.templates.ramdisk,
            skip_broken: file.packages.skip_broken,
            compression: Compression {
                kind: file.compression.kind,
                speed: file.compression.speed,
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    debug: Option<bool>,
    sharedir: Option<PathBuf>,
    colors: Option<bool>,
    encoding: Option<String>,
    ignorelist: Option<PathBuf>,
    ramdisk_template: Option<String>,
    skip_broken: Option<bool>,
    compression_type: Option<String>,
    compression_speed: Option<u32>,
}

impl ConfigBuilder {
    fn from_file(file: FileConfig) -> Self {
        Self {
            debug: Some(file.isotree.debug),
            sharedir: Some(PathBuf::from(file.isotree.sharedir)),
            colors: Some(file.output.colors),
            encoding: Some(file.output.encoding),
            ignorelist: Some(PathBuf::from(file.output.ignorelist)),
            ramdisk_template: Some(file.templates.ramdisk),
            skip_broken: Some(file.packages.skip_broken),
            compression_type: Some(file.compression.kind),
            compression_speed: Some(file.compression.speed),
        }
    }

    pub fn debug(mut self, v: bool) -> Self {
        self.debug = Some(v);
        self
    }

    pub fn sharedir(mut self, v: impl Into<PathBuf>) -> Self {
        self.sharedir = Some(v.into());
        self
    }

    pub fn colors(mut self, v: bool) -> Self {
        self.colors = Some(v);
        self
    }

    pub fn encoding(mut self, v: impl Into<String>) -> Self {
        self.encoding = Some(v.into());
        self
    }

    pub fn ignorelist(mut self, v: impl Into<PathBuf>) -> Self {
        self.ignorelist = Some(v.into());
        self
    }

    pub fn ramdisk_template(mut self, v: impl Into<String>) -> Self {
        self.ramdisk_template = Some(v.into());
        self
    }

    pub fn skip_broken(mut self, v: bool) -> Self {
        self.skip_broken = Some(v);
        self
    }

    pub fn compression_type(mut self, v: impl Into<String>) -> Self {
        self.compression_type = Some(v.into());
        self
    }

    pub fn compression_speed(mut self, v: u32) -> Self {
        self.compression_speed = Some(v);
        self
    }

    pub fn build(self) -> Result<Config> {
        let base = Config::default();
        let cfg = Config {
            debug: self.debug.unwrap_or(base.debug),
            sharedir: self.sharedir.unwrap_or(base.sharedir),
            colors: self.colors.unwrap_or(base.colors),
            encoding: self.encoding.unwrap_or(base.encoding),
            ignorelist: self.ignorelist.unwrap_or(base.ignorelist),
            ramdisk_template: self.ramdisk_template.unwrap_or(base.ramdisk_template),
            skip_broken: self.skip_broken.unwrap_or(base.skip_broken),
            compression: Compression {
                kind: self.compression_type.unwrap_or(base.compression.kind),
                speed: self.compression_speed.unwrap_or(base.compression.speed),
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl Config {
    /// Reject tunables the builders cannot honour.
    pub fn validate(&self) -> Result<()> {
        validate(self)
    }
}

fn validate(cfg: &Config) -> Result<()> {
    let kind = cfg.compression.kind.trim();
    if !SUPPORTED_COMPRESSION.contains(&kind) {
        return Err(Error::config(format!(
            "compression.type '{}' is not supported (expected one of: {})",
            cfg.compression.kind,
            SUPPORTED_COMPRESSION.join(", ")
        )));
    }
    if cfg.compression.speed > 9 {
        return Err(Error::config(format!(
            "compression.speed {} is out of range (0-9)",
            cfg.compression.speed
        )));
    }
    let enc = cfg.encoding.trim().to_ascii_lowercase();
    if enc != "utf-8" && enc != "utf8" {
        return Err(Error::config(format!(
            "output.encoding '{}' is not supported (only utf-8)",
            cfg.encoding
        )));
    }
    if cfg.sharedir.as_os_str().is_empty() {
        return Err(Error::config("isotree.sharedir is empty"));
    }
    if cfg.ramdisk_template.trim().is_empty() {
        return Err(Error::config("templates.ramdisk is empty"));
    }
    Ok(())
}

/// Parse TOML config text over the defaults.
pub fn parse(raw: &str) -> Result<ConfigBuilder> {
    let file: FileConfig = toml::from_str(raw)?;
    Ok(ConfigBuilder::from_file(file))
}

/// Load the config file at `path`. A missing file yields the defaults; the
/// returned builder can still be overridden (e.g. from CLI flags).
pub fn load(path: &Path) -> Result<ConfigBuilder> {
    if !path.is_file() {
        return Ok(ConfigBuilder::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read config {}: {e}", path.display())))?;
    parse(&raw).map_err(|e| Error::config(format!("TOML parse error in {}: {e}", path.display())))
}
