use anyhow::Result;
use log::{info, warn};

use cli::{distributor, RecordStore};

pub async fn handle_load(image: &str, cluster_name: &str) -> Result<()> {
    let record = distributor().load(image, cluster_name).await?;
    println!("{}", record.id());
    RecordStore::from_env().upsert_load(record)
}

/// Re-checks every recorded load and forgets the ones that went stale.
pub async fn handle_status() -> Result<()> {
    let store = RecordStore::from_env();
    let distributor = distributor();

    let mut current = vec![];
    for record in store.loads()? {
        match distributor.read(&record).await? {
            Some(record) => {
                println!("{}  {}", record.id(), record.image);
                current.push(record);
            }
            None => warn!("Load of {} into {} is stale", record.image, record.cluster_name),
        }
    }
    store.save_loads(&current)
}

pub async fn handle_forget(image: &str, cluster_name: &str) -> Result<()> {
    let store = RecordStore::from_env();
    let distributor = distributor();

    let (forgotten, kept): (Vec<_>, Vec<_>) = store
        .loads()?
        .into_iter()
        .partition(|l| l.image == image && l.cluster_name == cluster_name);
    if forgotten.is_empty() {
        info!("No load of {} into {} recorded", image, cluster_name);
    }
    for record in &forgotten {
        distributor.delete(record);
    }
    store.save_loads(&kept)
}
