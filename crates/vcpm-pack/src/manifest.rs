#![forbid(unsafe_code)]

//! Pack manifest discovery and validation.
//!
//! Checks run in a fixed order and stop at the first failure: the manifest
//! must exist, must carry both `id` and `version`, then `id` and `version`
//! must match their formats.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{BuildError, ManifestField, Result};
use crate::mode::BuildMode;

/// Manifest file names probed at the project root, in priority order.
pub const MANIFEST_CANDIDATES: [&str; 2] = ["package.json", "pack.toml"];

pub const ID_FORMAT: &str = "must start with a letter or underscore, contain only letters, numbers, and underscores, and be 2-24 characters long";
pub const VERSION_FORMAT: &str = "must be in the format X.Y.Z";

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{1,23}$").expect("static id pattern"));
static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("static version pattern"));

/// Validated identity of a content pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackIdentity {
    id: String,
    version: String,
}

impl PackIdentity {
    /// Validates `id` then `version`, reporting the first field that fails.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let version = version.into();

        if !ID_PATTERN.is_match(&id) {
            return Err(BuildError::ManifestFieldInvalid {
                field: ManifestField::Id,
                expected: ID_FORMAT,
            });
        }
        if !VERSION_PATTERN.is_match(&version) {
            return Err(BuildError::ManifestFieldInvalid {
                field: ManifestField::Version,
                expected: VERSION_FORMAT,
            });
        }

        Ok(Self { id, version })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// File name of the archive without extension, e.g. `base_1.0.0_dev`.
    pub fn archive_stem(&self, mode: BuildMode) -> String {
        format!("{}_{}{}", self.id, self.version, mode.file_suffix())
    }
}

impl fmt::Display for PackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

pub fn find_manifest_path(project_root: &Path) -> Option<PathBuf> {
    MANIFEST_CANDIDATES
        .iter()
        .map(|name| project_root.join(name))
        .find(|candidate| candidate.is_file())
}

/// Reads and validates the manifest at `project_root`.
pub fn load(project_root: &Path) -> Result<PackIdentity> {
    let path = find_manifest_path(project_root).ok_or_else(|| BuildError::ManifestMissing {
        root: project_root.to_path_buf(),
    })?;
    debug!(path = %path.display(), "reading pack manifest");

    let source = fs::read_to_string(&path).map_err(|source| match source.kind() {
        io::ErrorKind::InvalidData => BuildError::ManifestInvalid {
            path: path.clone(),
            reason: "manifest is not valid UTF-8".to_string(),
        },
        _ => BuildError::FileUnreadable {
            path: path.clone(),
            source,
        },
    })?;

    let document = parse_document(&path, &source)?;
    let id = required_string(&document, "id");
    let version = required_string(&document, "version");

    let (id, version) = match (id, version) {
        (Some(id), Some(version)) => (id, version),
        (id, version) => {
            let missing = [("id", id.is_none()), ("version", version.is_none())]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(BuildError::ManifestInvalid {
                path,
                reason: format!("missing required field(s): {missing}"),
            });
        }
    };

    PackIdentity::new(id, version)
}

fn parse_document(path: &Path, source: &str) -> Result<Value> {
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let invalid = |reason: String| BuildError::ManifestInvalid {
        path: path.to_path_buf(),
        reason,
    };

    let document = if is_toml {
        let table: toml::Table = toml::from_str(source).map_err(|err| invalid(err.to_string()))?;
        serde_json::to_value(table).map_err(|err| invalid(err.to_string()))?
    } else {
        serde_json::from_str(source).map_err(|err| invalid(err.to_string()))?
    };

    if !document.is_object() {
        return Err(invalid("manifest root must be an object".to_string()));
    }
    Ok(document)
}

/// Non-string and empty values count as absent.
fn required_string(document: &Value, key: &str) -> Option<String> {
    document
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_manifest(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).expect("write manifest");
    }

    fn assert_field_error(err: BuildError, expected_field: ManifestField) {
        match err {
            BuildError::ManifestFieldInvalid { field, .. } => assert_eq!(field, expected_field),
            other => panic!("expected field error for {expected_field}, got {other:?}"),
        }
    }

    #[test]
    fn loads_valid_json_manifest_unchanged() {
        let temp = tempdir().expect("temp dir");
        write_manifest(
            temp.path(),
            "package.json",
            r#"{"id": "test_package", "version": "1.0.0", "title": "Test"}"#,
        );

        let identity = load(temp.path()).expect("manifest loads");
        assert_eq!(identity.id(), "test_package");
        assert_eq!(identity.version(), "1.0.0");
        assert_eq!(identity.to_string(), "test_package@1.0.0");
    }

    #[test]
    fn loads_toml_manifest_when_json_absent() {
        let temp = tempdir().expect("temp dir");
        write_manifest(temp.path(), "pack.toml", "id = \"base\"\nversion = \"0.25.3\"\n");

        let identity = load(temp.path()).expect("manifest loads");
        assert_eq!(identity.id(), "base");
        assert_eq!(identity.version(), "0.25.3");
    }

    #[test]
    fn json_manifest_takes_priority() {
        let temp = tempdir().expect("temp dir");
        write_manifest(temp.path(), "package.json", r#"{"id": "from_json", "version": "1.0.0"}"#);
        write_manifest(temp.path(), "pack.toml", "id = \"from_toml\"\nversion = \"2.0.0\"\n");

        assert_eq!(load(temp.path()).expect("loads").id(), "from_json");
    }

    #[test]
    fn missing_manifest_is_reported() {
        let temp = tempdir().expect("temp dir");
        let err = load(temp.path()).expect_err("no manifest");
        assert!(matches!(err, BuildError::ManifestMissing { .. }));
    }

    #[test]
    fn presence_is_checked_before_format() {
        let temp = tempdir().expect("temp dir");
        // `id` is malformed, but `version` is absent: presence wins.
        write_manifest(temp.path(), "package.json", r#"{"id": "9bad id"}"#);
        let err = load(temp.path()).expect_err("partial manifest");
        match err {
            BuildError::ManifestInvalid { reason, .. } => assert!(reason.contains("version")),
            other => panic!("expected ManifestInvalid, got {other:?}"),
        }

        write_manifest(temp.path(), "package.json", r#"{"name": "test-name", "version": "1.0.0"}"#);
        let err = load(temp.path()).expect_err("missing id");
        assert!(matches!(err, BuildError::ManifestInvalid { .. }));
    }

    #[test]
    fn empty_and_non_string_fields_count_as_absent() {
        let temp = tempdir().expect("temp dir");
        write_manifest(temp.path(), "package.json", r#"{"id": "", "version": 1}"#);
        let err = load(temp.path()).expect_err("falsy fields");
        assert!(matches!(err, BuildError::ManifestInvalid { .. }));
    }

    #[test]
    fn malformed_documents_are_invalid() {
        let temp = tempdir().expect("temp dir");
        write_manifest(temp.path(), "package.json", "{ invalid json");
        assert!(matches!(
            load(temp.path()).expect_err("bad json"),
            BuildError::ManifestInvalid { .. }
        ));

        write_manifest(temp.path(), "package.json", r#"["id", "version"]"#);
        assert!(matches!(
            load(temp.path()).expect_err("array root"),
            BuildError::ManifestInvalid { .. }
        ));
    }

    #[test]
    fn id_is_checked_before_version() {
        let temp = tempdir().expect("temp dir");
        write_manifest(temp.path(), "package.json", r#"{"id": "test-package", "version": "1.0"}"#);
        assert_field_error(load(temp.path()).expect_err("bad id"), ManifestField::Id);
    }

    #[test]
    fn id_pattern_boundaries() {
        for valid in ["ab", "_x", "Base_Pack_2", "a23456789012345678901234"] {
            assert!(PackIdentity::new(valid, "1.0.0").is_ok(), "{valid} should be accepted");
        }
        for invalid in ["a", "1pack", "with-dash", "with space", "a234567890123456789012345", "päck"] {
            assert_field_error(
                PackIdentity::new(invalid, "1.0.0").expect_err(invalid),
                ManifestField::Id,
            );
        }
    }

    #[test]
    fn version_pattern_boundaries() {
        for valid in ["0.0.0", "1.0.0", "10.200.3000"] {
            assert!(PackIdentity::new("pack", valid).is_ok(), "{valid} should be accepted");
        }
        for invalid in ["1.0", "1.0.0-beta", "v1.0.0", "1.0.0.0", "1..0", "١.٢.٣"] {
            assert_field_error(
                PackIdentity::new("pack", invalid).expect_err(invalid),
                ManifestField::Version,
            );
        }
    }

    #[test]
    fn archive_stem_carries_dev_suffix_only_in_development() {
        let identity = PackIdentity::new("test_package", "1.0.0").expect("valid identity");
        assert_eq!(identity.archive_stem(BuildMode::Production), "test_package_1.0.0");
        assert_eq!(identity.archive_stem(BuildMode::Development), "test_package_1.0.0_dev");
    }
}
