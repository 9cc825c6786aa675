//! Operator bundle inspection and catalog build-context packing.
//!
//! A bundle is a `.tgz` of OLM manifests for one operator. Registration
//! unpacks it, reads the ClusterServiceVersion to learn the operator's
//! deployment name, and packs the kaniko build context that produces the
//! catalog image.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use serde_yaml::Value;
use tar::{Archive, Builder};

use crate::error::{AihubError, Result};
use crate::io;

#[derive(Debug)]
pub struct OperatorBundle {
    root: PathBuf,
}

impl OperatorBundle {
    /// Unpack a bundle archive into `dest`.
    pub fn unpack(archive: &Path, dest: &Path) -> Result<Self> {
        io::ensure_dir(dest)?;
        let file = File::open(archive).map_err(|err| AihubError::InvalidBundle {
            path: archive.to_path_buf(),
            detail: err.to_string(),
        })?;
        let mut tar = Archive::new(GzDecoder::new(file));
        tar.unpack(dest).map_err(|err| AihubError::InvalidBundle {
            path: archive.to_path_buf(),
            detail: format!("not a gzipped tar archive: {err}"),
        })?;
        Ok(Self {
            root: dest.to_path_buf(),
        })
    }

    /// The ClusterServiceVersion manifest, wherever it sits in the bundle.
    pub fn csv_path(&self) -> Option<PathBuf> {
        find_file(&self.root, csv_re())
    }

    /// Name of the operator deployment declared by the CSV.
    pub fn deployment_name(&self) -> Result<String> {
        let csv = self.csv_path().ok_or_else(|| AihubError::InvalidBundle {
            path: self.root.clone(),
            detail: "no clusterserviceversion.yaml in bundle".to_string(),
        })?;
        let doc: Value = serde_yaml::from_str(&std::fs::read_to_string(&csv)?)?;
        doc.get("spec")
            .and_then(|v| v.get("install"))
            .and_then(|v| v.get("spec"))
            .and_then(|v| v.get("deployments"))
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AihubError::InvalidBundle {
                path: csv,
                detail: "csv does not declare spec.install.spec.deployments[0].name".to_string(),
            })
    }
}

/// Pack the kaniko Dockerfile and operators tree into a build-context tgz.
pub fn pack_build_context(kaniko_dir: &Path, out: &Path) -> Result<()> {
    let file = File::create(out)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.append_path_with_name(kaniko_dir.join("Dockerfile"), "Dockerfile")?;
    builder.append_dir_all("operators", kaniko_dir.join("operators"))?;
    builder.into_inner()?.finish()?;
    Ok(())
}

static CSV_RE: OnceLock<Regex> = OnceLock::new();

fn csv_re() -> &'static Regex {
    CSV_RE.get_or_init(|| Regex::new(r"clusterserviceversion\.yaml$").unwrap())
}

fn find_file(root: &Path, pattern: &Regex) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file(&path, pattern) {
                return Some(found);
            }
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if pattern.is_match(name) {
                return Some(path);
            }
        }
    }
    None
}
