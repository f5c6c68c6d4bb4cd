//! Filesystem repository for artifact triples.
//!
//! Each file is written to a `.tmp` sibling and renamed into place; the
//! metadata file goes last so a reader never sees metadata describing a model
//! that is not on disk yet.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bincode::config;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::common::error::{PricingError, PricingResult};

use super::domain::{Artifact, ArtifactMetadata, ArtifactPaths, ModelRepo};

/// Persist artifact triples as `<version>_model*` files in one directory.
pub struct FsModelRepo {
    root: PathBuf,
}

impl FsModelRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn paths(&self, version: &str) -> ArtifactPaths {
        ArtifactPaths::for_version(&self.root, version)
    }

    /// Metadata alone, for reports that do not need the model.
    pub fn load_metadata(&self, version: &str) -> PricingResult<Option<ArtifactMetadata>> {
        let path = self.paths(version).metadata;
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> PricingResult<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> PricingResult<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(value, config::standard())?)
}

fn decode<T: DeserializeOwned>(path: &Path) -> PricingResult<T> {
    let bytes = fs::read(path)?;
    let (value, _) = bincode::serde::decode_from_slice(&bytes, config::standard())?;
    Ok(value)
}

impl ModelRepo for FsModelRepo {
    fn save(&self, artifact: &Artifact) -> PricingResult<ArtifactPaths> {
        let metadata = artifact.metadata.as_ref().ok_or_else(|| {
            PricingError::Serialization("refusing to save an artifact without metadata".into())
        })?;
        fs::create_dir_all(&self.root)?;
        let paths = self.paths(&metadata.version);

        write_atomic(&paths.model, &encode(&artifact.estimator)?)?;
        info!(path = %paths.model.display(), "model saved");

        match &artifact.scaler {
            Some(scaler) => {
                write_atomic(&paths.scaler, &encode(scaler)?)?;
                info!(path = %paths.scaler.display(), "scaler saved");
            }
            None => {
                // A stale scaler from an earlier run would be applied on load.
                if paths.scaler.exists() {
                    fs::remove_file(&paths.scaler)?;
                }
            }
        }

        let json = serde_json::to_vec_pretty(metadata)?;
        write_atomic(&paths.metadata, &json)?;
        info!(path = %paths.metadata.display(), "metadata saved");

        Ok(paths)
    }

    fn load(&self, version: &str) -> PricingResult<Artifact> {
        let paths = self.paths(version);
        if !paths.model.exists() {
            return Err(PricingError::ArtifactNotFound {
                version: version.to_string(),
                path: paths.model,
            });
        }
        let estimator = decode(&paths.model)?;

        let scaler = if paths.scaler.exists() {
            Some(decode(&paths.scaler)?)
        } else {
            warn!(version, "no scaler file, features will be used unscaled");
            None
        };

        let metadata = self.load_metadata(version)?;
        if metadata.is_none() {
            warn!(version, path = %paths.metadata.display(), "no metadata file");
        }

        info!(version, dir = %self.root.display(), "artifact loaded");
        Ok(Artifact {
            estimator,
            scaler,
            metadata,
        })
    }
}
