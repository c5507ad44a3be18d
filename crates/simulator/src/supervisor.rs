//! Multi-zone runtime supervisor: polls the topology file's mtime and
//! reconciles the set of running zone workers against it, spawning a tick
//! task for each newly-declared zone and cancelling the task for any zone
//! that disappeared. Grounded on `poultry_config::topology::HotReload`
//! (the poll primitive) and on `crates/hub/src/main.rs`'s pattern of
//! `tokio::spawn`-ing one task per managed unit and tracking its
//! `JoinHandle` for later cleanup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use poultry_common::bus::Publisher;
use poultry_common::model::{FarmId, ZoneId};
use poultry_config::{resolve, HotReload, Topology};
use poultry_knowledge::KnowledgeStore;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::worker::ZoneWorker;

pub const TOPOLOGY_POLL_INTERVAL: Duration = Duration::from_secs(5);

struct ManagedZone {
    worker: Arc<ZoneWorker>,
    handle: JoinHandle<()>,
}

/// Owns the live set of zone workers. Not `Send`-shared directly — runs on
/// its own task, driving reconciliation and exposing [`Supervisor::worker`]
/// for the MQTT command dispatch loop to route `cmd/{actuator}` messages.
pub struct Supervisor {
    topology_path: std::path::PathBuf,
    publisher: Arc<dyn Publisher>,
    knowledge: Arc<dyn KnowledgeStore>,
    dt_s: f64,
    zones: Mutex<HashMap<(FarmId, ZoneId), ManagedZone>>,
}

impl Supervisor {
    pub fn new(
        topology_path: impl Into<std::path::PathBuf>,
        publisher: Arc<dyn Publisher>,
        knowledge: Arc<dyn KnowledgeStore>,
        dt_s: f64,
    ) -> Self {
        Self {
            topology_path: topology_path.into(),
            publisher,
            knowledge,
            dt_s,
            zones: Mutex::new(HashMap::new()),
        }
    }

    /// Poll the topology file forever, spawning/retiring workers as zones
    /// are added/removed. Never returns under normal operation.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut reload = HotReload::new(self.topology_path.clone());
        loop {
            match reload.poll() {
                Ok(Some(topology)) => self.reconcile(&topology).await,
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "topology poll failed, keeping prior state"),
            }
            tokio::time::sleep(TOPOLOGY_POLL_INTERVAL).await;
        }
    }

    async fn reconcile(&self, topology: &Topology) {
        let desired: Vec<(FarmId, ZoneId)> = topology
            .zone_keys()
            .into_iter()
            .map(|(farm, zone)| (FarmId::from(farm), ZoneId::from(zone)))
            .collect();

        let mut zones = self.zones.lock().await;

        let stale: Vec<(FarmId, ZoneId)> = zones
            .keys()
            .filter(|key| !desired.contains(key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(managed) = zones.remove(&key) {
                managed.handle.abort();
                tracing::info!(farm = %key.0, zone = %key.1, "retired zone worker");
            }
        }

        for (farm, zone) in desired {
            if zones.contains_key(&(farm.clone(), zone.clone())) {
                continue;
            }
            let worker = Arc::new(ZoneWorker::new(farm.clone(), zone.clone()));
            let task_worker = Arc::clone(&worker);
            let publisher = Arc::clone(&self.publisher);
            let knowledge = Arc::clone(&self.knowledge);
            let dt_s = self.dt_s;
            let farm_for_config = farm.clone();
            let zone_for_config = zone.clone();
            let topology_path = self.topology_path.clone();

            let handle = tokio::spawn(async move {
                let config_source = move || {
                    poultry_config::load(&topology_path)
                        .map(|t| t.resolve(farm_for_config.as_str(), zone_for_config.as_str()))
                        .unwrap_or_else(|_| resolve(&Default::default(), &Default::default(), &Default::default()))
                };
                task_worker.run(config_source, publisher, knowledge, dt_s).await;
            });

            tracing::info!(farm = %farm, zone = %zone, "started zone worker");
            zones.insert((farm, zone), ManagedZone { worker, handle });
        }
    }

    /// Look up the worker for `(farm, zone)`, if currently managed.
    pub async fn worker(&self, farm: &FarmId, zone: &ZoneId) -> Option<Arc<ZoneWorker>> {
        let zones = self.zones.lock().await;
        zones.get(&(farm.clone(), zone.clone())).map(|m| Arc::clone(&m.worker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poultry_common::bus::InMemoryBus;
    use poultry_knowledge::InMemoryKnowledgeStore;
    use std::io::Write;

    fn write_topology(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn reconcile_spawns_a_worker_per_declared_zone() {
        let file = write_topology(
            r#"{
                "farms": [
                    { "id": "farm-a", "zones": [ "zone-1", "zone-2" ] }
                ]
            }"#,
        );
        let topology = poultry_config::load(file.path()).unwrap();
        let supervisor = Supervisor::new(
            file.path(),
            Arc::new(InMemoryBus::new()),
            Arc::new(InMemoryKnowledgeStore::new()),
            1.0,
        );
        supervisor.reconcile(&topology).await;
        let zones = supervisor.zones.lock().await;
        assert_eq!(zones.len(), 2);
    }

    #[tokio::test]
    async fn reconcile_retires_workers_for_removed_zones() {
        let file = write_topology(
            r#"{
                "farms": [
                    { "id": "farm-a", "zones": [ { "id": "zone-1" } ] }
                ]
            }"#,
        );
        let supervisor = Supervisor::new(
            file.path(),
            Arc::new(InMemoryBus::new()),
            Arc::new(InMemoryKnowledgeStore::new()),
            1.0,
        );
        let with_zone = poultry_config::load(file.path()).unwrap();
        supervisor.reconcile(&with_zone).await;
        assert_eq!(supervisor.zones.lock().await.len(), 1);

        let empty = Topology::default();
        supervisor.reconcile(&empty).await;
        assert_eq!(supervisor.zones.lock().await.len(), 0);
    }
}
