use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kind_defs::{ClusterRecord, LoadRecord};
use log::debug;

pub const DEFAULT_STATE_DIR: &str = ".kindweave";

/// Records kept between invocations, one YAML file per cluster plus a single
/// list of image loads.
///
/// ```text
/// .kindweave/
///   clusters/<name>.yaml
///   loads.yaml
/// ```
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: &Path) -> Self {
        RecordStore {
            root: root.to_path_buf(),
        }
    }

    /// Uses `KINDWEAVE_STATE_DIR` when set, otherwise `.kindweave` in the
    /// working directory.
    pub fn from_env() -> Self {
        let root = std::env::var("KINDWEAVE_STATE_DIR")
            .ok()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_STATE_DIR.to_string());
        RecordStore::new(Path::new(&root))
    }

    fn clusters_dir(&self) -> PathBuf {
        self.root.join("clusters")
    }

    fn cluster_path(&self, name: &str) -> PathBuf {
        self.clusters_dir().join(format!("{}.yaml", name))
    }

    fn loads_path(&self) -> PathBuf {
        self.root.join("loads.yaml")
    }

    pub fn load_cluster(&self, name: &str) -> Result<Option<ClusterRecord>> {
        let path = self.cluster_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(record))
    }

    pub fn save_cluster(&self, record: &ClusterRecord) -> Result<()> {
        fs::create_dir_all(self.clusters_dir())?;
        let path = self.cluster_path(record.name());
        fs::write(&path, serde_yaml::to_string(record)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Stored record for {} in {}", record.name(), path.display());
        Ok(())
    }

    pub fn remove_cluster(&self, name: &str) -> Result<()> {
        let path = self.cluster_path(name);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    pub fn cluster_names(&self) -> Result<Vec<String>> {
        let dir = self.clusters_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut names = vec![];
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn loads(&self) -> Result<Vec<LoadRecord>> {
        let path = self.loads_path();
        if !path.exists() {
            return Ok(vec![]);
        }
        let contents = fs::read_to_string(&path)?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save_loads(&self, loads: &[LoadRecord]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.loads_path(), serde_yaml::to_string(loads)?)?;
        Ok(())
    }

    /// Replaces any earlier load of the same image into the same cluster.
    pub fn upsert_load(&self, record: LoadRecord) -> Result<()> {
        let mut loads = self.loads()?;
        loads.retain(|l| !(l.image == record.image && l.cluster_name == record.cluster_name));
        loads.push(record);
        self.save_loads(&loads)
    }
}
