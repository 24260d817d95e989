use std::{fs, path::Path};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::blueprint::Blueprint;

pub const DEFAULT_VERSION_MAP_PATH: &str = "config/version-map.yaml";

const MAJOR_RANGE: (u64, u64) = (1, 3);
const MINOR_RANGE: (u64, u64) = (0, 20);
const PATCH_RANGE: (u64, u64) = (0, 30);

#[derive(Debug, thiserror::Error)]
pub enum VersionMapError {
    #[error("failed to access version map {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid version map yaml: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMap {
    #[serde(default)]
    pub applications: Vec<AppSeeds>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSeeds {
    pub key: String,
    #[serde(default)]
    pub seeds: SeedPair,
    #[serde(default)]
    pub packages: Vec<PackageSeed>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackageSeed {
    #[serde(rename = "type")]
    pub package_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

impl VersionMap {
    pub fn load(path: &Path) -> Result<Self, VersionMapError> {
        let raw = fs::read_to_string(path).map_err(|source| VersionMapError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, VersionMapError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_bw::from_str(raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), VersionMapError> {
        let io_err = |source| VersionMapError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let yaml = serde_yaml_bw::to_string(self)?;
        fs::write(path, yaml).map_err(io_err)
    }

    pub fn app(&self, key: &str) -> Option<&AppSeeds> {
        self.applications.iter().find(|app| app.key.trim() == key)
    }

    /// Adds entries and seeds for every blueprint application and docker
    /// package that lacks them. Existing seeds are never replaced.
    pub fn fill_missing<R: Rng>(&mut self, blueprint: &Blueprint, rng: &mut R) -> usize {
        let mut added = 0;
        for service in &blueprint.services {
            let key = service.application.key.clone();
            let index = match self.applications.iter().position(|app| app.key == key) {
                Some(index) => index,
                None => {
                    self.applications.push(AppSeeds {
                        key,
                        ..AppSeeds::default()
                    });
                    self.applications.len() - 1
                }
            };
            let entry = &mut self.applications[index];
            if entry.seeds.application.is_none() {
                entry.seeds.application = Some(random_seed(rng));
                added += 1;
            }
            if entry.seeds.build.is_none() {
                entry.seeds.build = Some(random_seed(rng));
                added += 1;
            }
            for image in &service.images {
                let known = entry
                    .packages
                    .iter()
                    .any(|pkg| pkg.package_type == "docker" && pkg.name == *image);
                if !known {
                    entry.packages.push(PackageSeed {
                        package_type: "docker".into(),
                        name: image.clone(),
                        seed: Some(random_seed(rng)),
                    });
                    added += 1;
                }
            }
        }
        added
    }
}

pub fn random_seed<R: Rng>(rng: &mut R) -> String {
    format!(
        "{}.{}.{}",
        rng.random_range(MAJOR_RANGE.0..=MAJOR_RANGE.1),
        rng.random_range(MINOR_RANGE.0..=MINOR_RANGE.1),
        rng.random_range(PATCH_RANGE.0..=PATCH_RANGE.1)
    )
}
