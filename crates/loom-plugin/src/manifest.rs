//! Plugin manifest: the static, versioned identity of a plugin.

use std::collections::HashSet;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use tracing::warn;

use loom_core::{AppError, AppResult};

/// SPDX identifiers accepted without a warning.
pub const COMMON_LICENSES: &[&str] = &["MIT", "Apache-2.0", "GPL-3.0", "BSD-3-Clause", "ISC"];

/// A dependency on another plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Name of the required plugin.
    pub name: String,
    /// Versions of it that satisfy this plugin.
    pub version_req: VersionReq,
}

/// Validated plugin identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Unique kebab-case name.
    pub name: String,
    /// Plugin version.
    pub version: Version,
    /// Short description.
    pub description: Option<String>,
    /// Author or maintainer.
    pub author: Option<String>,
    /// SPDX license identifier.
    pub license: Option<String>,
    /// Host versions the plugin runs on.
    pub compatibility: VersionReq,
    /// Plugins that must be installed (and active, to activate) first.
    pub dependencies: Vec<Dependency>,
}

impl Manifest {
    /// Parses and validates a JSON manifest file.
    pub fn from_json(source: &str) -> AppResult<Self> {
        let file: ManifestFile = serde_json::from_str(source)?;
        file.into_manifest()
    }

    /// Returns whether the manifest declares a dependency on `name`.
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.name == name)
    }
}

/// A dependency as written in a manifest file: either `"name"`,
/// `"name@range"`, or `{ "name": .., "version": .. }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// Shorthand string form.
    Short(String),
    /// Explicit form.
    Full {
        /// Required plugin.
        name: String,
        /// Version range; any version when absent.
        #[serde(default)]
        version: Option<String>,
    },
}

impl DependencySpec {
    fn split(&self) -> (String, Option<String>) {
        match self {
            Self::Short(spec) => match spec.split_once('@') {
                Some((name, range)) => (name.trim().to_string(), Some(range.trim().to_string())),
                None => (spec.trim().to_string(), None),
            },
            Self::Full { name, version } => (name.clone(), version.clone()),
        }
    }
}

/// Unparsed manifest fields, as read from a file or accumulated by the builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Plugin name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Author.
    #[serde(default)]
    pub author: Option<String>,
    /// License.
    #[serde(default)]
    pub license: Option<String>,
    /// Compatibility range; `*` when absent.
    #[serde(default)]
    pub compatibility: Option<String>,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

impl ManifestFile {
    /// Parses the raw fields and runs structural validation.
    ///
    /// All problems are reported together in one `Validation` error.
    pub fn into_manifest(self) -> AppResult<Manifest> {
        let mut errors = Vec::new();

        if self.name.is_empty() {
            errors.push("plugin name must not be empty".to_string());
        } else if !is_kebab_case(&self.name) {
            errors.push(format!("plugin name '{}' must be kebab-case", self.name));
        }

        let version = match Version::parse(self.version.trim()) {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(format!("version '{}' is not valid semver: {}", self.version, e));
                None
            }
        };

        let compatibility = match self.compatibility.as_deref() {
            None => Some(VersionReq::STAR),
            Some(range) => match VersionReq::parse(range.trim()) {
                Ok(req) => Some(req),
                Err(e) => {
                    errors.push(format!("compatibility '{}' is not a valid range: {}", range, e));
                    None
                }
            },
        };

        let mut dependencies = Vec::with_capacity(self.dependencies.len());
        let mut seen = HashSet::new();
        for spec in &self.dependencies {
            let (name, range) = spec.split();
            if name.is_empty() {
                errors.push("dependency name must not be empty".to_string());
                continue;
            }
            if name == self.name {
                errors.push("plugin cannot depend on itself".to_string());
                continue;
            }
            if !seen.insert(name.clone()) {
                errors.push(format!("dependency '{}' is declared twice", name));
                continue;
            }
            let version_req = match range.as_deref() {
                None => VersionReq::STAR,
                Some(r) => match VersionReq::parse(r) {
                    Ok(req) => req,
                    Err(e) => {
                        errors.push(format!(
                            "dependency '{}' has invalid range '{}': {}",
                            name, r, e
                        ));
                        continue;
                    }
                },
            };
            dependencies.push(Dependency { name, version_req });
        }

        match (version, compatibility) {
            (Some(version), Some(compatibility)) if errors.is_empty() => Ok(Manifest {
                name: self.name,
                version,
                description: self.description,
                author: self.author,
                license: self.license,
                compatibility,
                dependencies,
            }),
            _ => Err(AppError::validation(format!(
                "Invalid manifest for '{}': {}",
                self.name,
                errors.join("; ")
            ))),
        }
    }
}

/// Registry-side manifest checks that depend on host configuration.
#[derive(Debug, Clone)]
pub struct ManifestValidator {
    reserved_names: HashSet<String>,
}

impl ManifestValidator {
    /// Creates a validator rejecting the given names.
    pub fn new<I, S>(reserved_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved_names: reserved_names.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks a manifest before install. Returns non-fatal warnings.
    pub fn validate(&self, manifest: &Manifest) -> AppResult<Vec<String>> {
        if self.reserved_names.contains(&manifest.name) {
            return Err(AppError::validation(format!(
                "Plugin name '{}' is reserved",
                manifest.name
            )));
        }

        let mut warnings = Vec::new();
        if let Some(license) = &manifest.license {
            if !COMMON_LICENSES.contains(&license.as_str()) {
                warnings.push(format!(
                    "License '{}' is not a common SPDX identifier",
                    license
                ));
            }
        }

        for warning in &warnings {
            warn!(plugin = %manifest.name, "{}", warning);
        }
        Ok(warnings)
    }

    /// Checks the manifest's compatibility range against the running host.
    pub fn check_host(&self, manifest: &Manifest, host_version: &Version) -> AppResult<()> {
        if manifest.compatibility.matches(host_version) {
            Ok(())
        } else {
            Err(AppError::validation(format!(
                "Plugin '{}' requires host {}, running {}",
                manifest.name, manifest.compatibility, host_version
            )))
        }
    }
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new(["core", "system"])
    }
}

/// Returns whether `name` is lowercase words joined by single hyphens.
pub fn is_kebab_case(name: &str) -> bool {
    !name.is_empty()
        && name.split('-').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}
