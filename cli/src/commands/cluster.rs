use anyhow::{anyhow, Result};
use kind_common::diff_cluster_spec;
use kind_defs::{ClusterIdentity, ClusterRecord, ClusterSpec, ClusterState};
use log::{info, warn};

use cli::{controller, read_spec_file, summarize, with_timeout, RecordStore};

/// Creates the cluster described in `file`, replacing it when an immutable
/// field changed since the last apply.
pub async fn handle_apply(file: &str) -> Result<()> {
    let spec = read_spec_file(file)?;
    let controller = controller()?;
    let store = RecordStore::from_env();
    let config = controller.config().clone();

    if let Some(mut record) = store.load_cluster(&spec.name)? {
        controller.read(&mut record).await?;
        if record.state != ClusterState::Absent {
            let changes = diff_cluster_spec(&spec, &record.spec);
            if changes.is_empty() {
                info!("Cluster {} is up to date", spec.name);
                store.save_cluster(&record)?;
                println!("{}", summarize(&record)?);
                return Ok(());
            }
            let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
            info!(
                "Replacing cluster {}, changed: {}",
                spec.name,
                fields.join(", ")
            );
            let record = with_timeout(config.update_timeout, "cluster replacement", async {
                controller.delete(&mut record).await?;
                controller.create(spec).await
            })
            .await?;
            store.save_cluster(&record)?;
            println!("{}", summarize(&record)?);
            return Ok(());
        }
        warn!(
            "Cluster {} was recorded but no longer exists, creating it again",
            spec.name
        );
    }

    let record = controller.create(spec).await?;
    store.save_cluster(&record)?;
    println!("{}", summarize(&record)?);
    Ok(())
}

pub async fn handle_read(name: &str) -> Result<()> {
    let store = RecordStore::from_env();
    let mut record = store
        .load_cluster(name)?
        .ok_or_else(|| anyhow!("No record for cluster {}, apply it first", name))?;

    controller()?.read(&mut record).await?;
    if record.state == ClusterState::Absent {
        warn!("Cluster {} is gone, dropping its record", name);
        store.remove_cluster(name)?;
    } else {
        store.save_cluster(&record)?;
    }
    println!("{}", summarize(&record)?);
    Ok(())
}

/// Read-only view of any kind cluster, managed here or not.
pub async fn handle_get(name: &str, show_kubeconfig: bool) -> Result<()> {
    let record = controller()?.lookup(name).await?;
    match (&record.credentials, show_kubeconfig) {
        (Some(credentials), true) => println!("{}", credentials.kubeconfig),
        _ => println!("{}", summarize(&record)?),
    }
    Ok(())
}

pub async fn handle_delete(name: &str) -> Result<()> {
    let store = RecordStore::from_env();
    let controller = controller()?;
    let mut record = match store.load_cluster(name)? {
        Some(record) => record,
        None => {
            warn!("No record for cluster {}, deleting by name", name);
            let mut record = ClusterRecord::absent(ClusterSpec::new(name));
            record.state = ClusterState::Ready;
            record
        }
    };

    let delete_timeout = controller.config().delete_timeout;
    with_timeout(delete_timeout, "cluster deletion", controller.delete(&mut record)).await?;
    store.remove_cluster(name)?;
    info!("Cluster {} deleted", name);
    Ok(())
}

pub async fn handle_list() -> Result<()> {
    let store = RecordStore::from_env();
    let managed = store.cluster_names()?;
    for name in controller()?.list().await? {
        let marker = if managed.contains(&name) { "*" } else { " " };
        println!("{} {}", marker, name);
    }
    Ok(())
}

/// Prints what an apply of `file` would change.
pub async fn handle_diff(file: &str) -> Result<()> {
    let spec = read_spec_file(file)?;
    let store = RecordStore::from_env();

    let Some(record) = store.load_cluster(&spec.name)? else {
        println!("+ cluster {} will be created", spec.name);
        return Ok(());
    };

    let changes = diff_cluster_spec(&spec, &record.spec);
    if changes.is_empty() {
        println!("  cluster {} is up to date", spec.name);
        return Ok(());
    }
    println!("-/+ cluster {} must be replaced", spec.name);
    for change in changes {
        println!("    ~ {} (forces replacement)", change.field);
    }
    Ok(())
}

pub async fn handle_ephemeral_create(name: &str) -> Result<()> {
    let record = controller()?.create_ephemeral(name).await?;
    RecordStore::from_env().save_cluster(&record)?;
    println!("{}", summarize(&record)?);
    Ok(())
}

pub async fn handle_ephemeral_delete(name: &str) -> Result<()> {
    let store = RecordStore::from_env();
    let controller = controller()?;
    let mut record = match store.load_cluster(name)? {
        Some(record) => record,
        None => {
            let mut record = ClusterRecord::absent(ClusterSpec::new(name));
            record.id = Some(ClusterIdentity::ephemeral(name));
            record.state = ClusterState::Ready;
            record.ephemeral = true;
            record
        }
    };

    let delete_timeout = controller.config().delete_timeout;
    with_timeout(delete_timeout, "cluster deletion", controller.delete(&mut record)).await?;
    store.remove_cluster(name)?;
    info!("Ephemeral cluster {} deleted", name);
    Ok(())
}
