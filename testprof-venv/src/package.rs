//! Installed package records

use crate::errors::VenvError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which installed packages to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PackageType {
    #[default]
    Any,
    /// Development version with no source checkout (or an egg)
    Dev,
    /// Development version installed from a source checkout
    Src,
    /// Anything that is not a development install
    Rel,
}

impl FromStr for PackageType {
    type Err = VenvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ANY" => Ok(PackageType::Any),
            "DEV" => Ok(PackageType::Dev),
            "SRC" => Ok(PackageType::Src),
            "REL" => Ok(PackageType::Rel),
            other => Err(VenvError::InvalidPackageType(other.to_string())),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackageType::Any => "ANY",
            PackageType::Dev => "DEV",
            PackageType::Src => "SRC",
            PackageType::Rel => "REL",
        })
    }
}

/// A distribution installed in an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    pub version: String,
    pub source_path: Option<String>,
}

impl PackageEntry {
    pub fn new(name: impl Into<String>, version: impl Into<String>, source_path: Option<String>) -> Self {
        Self { name: name.into(), version: version.into(), source_path }
    }

    fn is_dev_version(&self) -> bool {
        self.version.contains("dev")
    }

    fn is_egg(&self) -> bool {
        self.source_path.as_deref().is_some_and(|p| p.ends_with(".egg"))
    }

    #[must_use]
    pub fn is_src(&self) -> bool {
        self.is_dev_version() && self.source_path.is_some() && !self.is_egg()
    }

    #[must_use]
    pub fn is_dev(&self) -> bool {
        let no_source = self.source_path.as_deref().is_none_or(str::is_empty);
        self.is_dev_version() && (no_source || self.is_egg())
    }

    #[must_use]
    pub fn is_rel(&self) -> bool {
        !self.is_dev()
    }

    #[must_use]
    pub fn matches(&self, package_type: PackageType) -> bool {
        match package_type {
            PackageType::Any => true,
            PackageType::Dev => self.is_dev(),
            PackageType::Src => self.is_src(),
            PackageType::Rel => self.is_rel(),
        }
    }
}

/// Parse `name version location` lines into entries keyed by name.
///
/// The location is everything after the version, so it may contain spaces.
/// Blank lines are skipped.
///
/// # Errors
/// Fails on a non-blank line with fewer than two fields.
pub fn parse_listing(listing: &str) -> Result<BTreeMap<String, PackageEntry>, VenvError> {
    let mut packages = BTreeMap::new();
    for line in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut fields = line.splitn(3, char::is_whitespace);
        let (Some(name), Some(version)) = (fields.next(), fields.next()) else {
            return Err(VenvError::MalformedPackageLine(line.to_string()));
        };
        let location = fields.next().map(str::trim).filter(|l| !l.is_empty()).map(String::from);
        packages.insert(name.to_string(), PackageEntry::new(name, version, location));
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_classification() {
        let release = PackageEntry::new("requests", "2.31.0", Some("/venv/lib/site-packages".into()));
        assert!(release.is_rel() && !release.is_dev() && !release.is_src());

        let checkout = PackageEntry::new("mylib", "0.2.dev3", Some("/src/mylib".into()));
        assert!(checkout.is_src() && checkout.is_rel() && !checkout.is_dev());

        let egg = PackageEntry::new("mylib", "0.2.dev3", Some("/venv/mylib-0.2.dev3.egg".into()));
        assert!(egg.is_dev() && !egg.is_src());

        let bare = PackageEntry::new("mylib", "0.2.dev3", None);
        assert!(bare.is_dev() && !bare.is_src());
    }

    #[test]
    fn test_matches_each_type() {
        let egg = PackageEntry::new("mylib", "1.0.dev0", Some("x.egg".into()));
        assert!(egg.matches(PackageType::Any));
        assert!(egg.matches(PackageType::Dev));
        assert!(!egg.matches(PackageType::Src));
        assert!(!egg.matches(PackageType::Rel));
    }

    #[test]
    fn test_package_type_from_str() {
        assert_eq!("SRC".parse::<PackageType>().unwrap(), PackageType::Src);
        assert!(matches!("src".parse::<PackageType>(), Err(VenvError::InvalidPackageType(_))));
    }

    #[test]
    fn test_parse_listing() {
        let listing = "pip 24.0 /venv/lib/python3.12/site-packages\n\n  mylib 0.1.dev0 /home/me/My Projects/mylib  \n";
        let packages = parse_listing(listing).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages["pip"].version, "24.0");
        assert_eq!(packages["mylib"].source_path.as_deref(), Some("/home/me/My Projects/mylib"));

        assert!(parse_listing("lonely\n").is_err());
    }
}
