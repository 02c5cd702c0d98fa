use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::models::is_valid_plant_id;
use crate::session::PlantMetadata;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlantsIndex {
    plants: Vec<String>,
}

/// Registered plants: an ordered index plus one metadata file per plant.
pub struct PlantRegistry {
    metadata_dir: PathBuf,
    index: PlantsIndex,
}

impl PlantRegistry {
    pub fn open(base_dir: &Path) -> Result<Self> {
        let metadata_dir = base_dir.join("metadata");
        fs::create_dir_all(metadata_dir.join("plants")).with_context(|| {
            format!("failed to create plant metadata dir under {}", metadata_dir.display())
        })?;

        let index_path = metadata_dir.join("plants_index.json");
        let registry = if index_path.exists() {
            let contents = fs::read_to_string(&index_path)
                .with_context(|| format!("failed to read {}", index_path.display()))?;
            let index = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse {}", index_path.display()))?;
            Self {
                metadata_dir,
                index,
            }
        } else {
            let registry = Self {
                metadata_dir,
                index: PlantsIndex::default(),
            };
            registry.save_index()?;
            registry
        };

        Ok(registry)
    }

    pub fn register(&mut self, plant: &PlantMetadata) -> Result<()> {
        if !is_valid_plant_id(&plant.plant_id) {
            bail!(
                "plant id '{}' must be non-empty and use only [A-Za-z0-9_-]",
                plant.plant_id
            );
        }
        if self.contains(&plant.plant_id) {
            bail!("plant '{}' is already registered", plant.plant_id);
        }

        let serialized = serde_json::to_string_pretty(plant)?;
        let path = self.plant_path(&plant.plant_id);
        fs::write(&path, serialized)
            .with_context(|| format!("failed to write {}", path.display()))?;

        self.index.plants.push(plant.plant_id.clone());
        self.save_index()
    }

    pub fn contains(&self, plant_id: &str) -> bool {
        self.index.plants.iter().any(|id| id == plant_id)
    }

    pub fn get(&self, plant_id: &str) -> Result<Option<PlantMetadata>> {
        if !self.contains(plant_id) {
            return Ok(None);
        }
        let path = self.plant_path(plant_id);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let plant = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(plant))
    }

    /// All registered plants in registration order.
    pub fn plants(&self) -> Result<Vec<PlantMetadata>> {
        let mut plants = Vec::with_capacity(self.index.plants.len());
        for plant_id in &self.index.plants {
            if let Some(plant) = self.get(plant_id)? {
                plants.push(plant);
            }
        }
        Ok(plants)
    }

    fn plant_path(&self, plant_id: &str) -> PathBuf {
        self.metadata_dir
            .join("plants")
            .join(format!("{plant_id}.json"))
    }

    fn save_index(&self) -> Result<()> {
        let path = self.metadata_dir.join("plants_index.json");
        let serialized = serde_json::to_string_pretty(&self.index)?;
        fs::write(&path, serialized).with_context(|| format!("failed to write {}", path.display()))
    }
}
