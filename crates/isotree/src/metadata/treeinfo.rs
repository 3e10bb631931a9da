use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::fsutil;
use crate::metadata::{Sections, render_ini};

const GENERAL: &str = "general";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeInfo {
    pub product: String,
    pub version: String,
    pub variant: String,
    pub base_arch: String,
    package_dir: String,
    sections: Sections,
}

impl TreeInfo {
    pub fn new(
        product: impl Into<String>,
        version: impl Into<String>,
        variant: impl Into<String>,
        base_arch: impl Into<String>,
        package_dir: impl Into<String>,
    ) -> Self {
        Self {
            product: product.into(),
            version: version.into(),
            variant: variant.into(),
            base_arch: base_arch.into(),
            package_dir: package_dir.into(),
            sections: Sections::new(),
        }
    }

    /// Merge `data` into `section`; later keys overwrite earlier ones.
    pub fn add_section(&mut self, section: &str, data: &BTreeMap<String, String>) -> Result<()> {
        let name = section.trim();
        if name.is_empty() || name.contains(['[', ']', '\n']) {
            return Err(Error::msg(format!("invalid treeinfo section name '{section}'")));
        }
        if name == GENERAL {
            return Err(Error::msg("treeinfo section 'general' is reserved"));
        }
        let slot = self.sections.entry(name.to_string()).or_default();
        for (k, v) in data {
            slot.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    pub fn package_dir(&self) -> &str {
        &self.package_dir
    }

    pub fn sections(&self) -> &Sections {
        &self.sections
    }

    pub fn render(&self, timestamp: i64) -> String {
        let mut general = BTreeMap::new();
        general.insert("family".to_string(), self.product.clone());
        general.insert("timestamp".to_string(), timestamp.to_string());
        general.insert("variant".to_string(), self.variant.clone());
        general.insert("version".to_string(), self.version.clone());
        general.insert("packagedir".to_string(), self.package_dir.clone());
        general.insert("arch".to_string(), self.base_arch.clone());

        let mut all: Vec<(&str, &BTreeMap<String, String>)> = vec![(GENERAL, &general)];
        all.extend(self.sections.iter().map(|(k, v)| (k.as_str(), v)));
        render_ini(&all)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fsutil::write_text(path, &self.render(Utc::now().timestamp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn renders_general_then_sorted_sections() {
        let mut info = TreeInfo::new("Fedora", "42", "Server", "x86_64", "");
        info.add_section("stage2", &kv(&[("mainimage", "images/install.img")]))
            .expect("add");
        info.add_section(
            "images-x86_64",
            &kv(&[("kernel", "images/pxeboot/vmlinuz"), ("initrd", "images/pxeboot/initrd.img")]),
        )
        .expect("add");

        let got = info.render(1_700_000_000);
        let expected = "[general]\narch = x86_64\nfamily = Fedora\npackagedir = \ntimestamp = 1700000000\nvariant = Server\nversion = 42\n\n[images-x86_64]\ninitrd = images/pxeboot/initrd.img\nkernel = images/pxeboot/vmlinuz\n\n[stage2]\nmainimage = images/install.img\n";
        assert_eq!(got, expected);
    }

    #[test]
    fn package_dir_lands_in_general() {
        let info = TreeInfo::new("Fedora", "42", "Everything", "x86_64", "Packages");
        assert_eq!(info.package_dir(), "Packages");
        assert!(
            info.render(0).contains("\npackagedir = Packages\n"),
            "{}",
            info.render(0)
        );
    }

    #[test]
    fn rejects_general_and_bad_names() {
        let mut info = TreeInfo::new("Fedora", "42", "", "x86_64", "");
        assert!(info.add_section("general", &kv(&[("a", "b")])).is_err());
        assert!(info.add_section("bad]name", &kv(&[])).is_err());
        assert!(info.add_section(" ", &kv(&[])).is_err());
    }

    #[test]
    fn repeated_section_merges_keys() {
        let mut info = TreeInfo::new("Fedora", "42", "", "x86_64", "");
        info.add_section("checksums", &kv(&[("a", "1")])).expect("add");
        info.add_section("checksums", &kv(&[("a", "2"), ("b", "3")])).expect("add");
        assert_eq!(info.sections()["checksums"], kv(&[("a", "2"), ("b", "3")]));
    }
}
