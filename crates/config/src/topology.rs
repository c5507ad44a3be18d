//! The declarative farm/zone topology document. A single `system_config.json`
//! file lists every farm and its zones, plus config overrides at the
//! defaults/farm/zone scopes (spec §3/§6). Grounded on `drewalth-irrigation`'s
//! `crates/hub/src/config.rs::load()` for the load/resolve shape, generalized
//! from one hub's flat zone list to farms nested with zones, and on
//! `common/config.py`'s `load_system_config`/`get_config` for the JSON format
//! and the bare-string zone shorthand (`config.py:36`'s `elif z == zone_id`):
//! a zone entry is either a bare id string (inherits farm/defaults entirely)
//! or an object carrying its own `config` subtree.
use crate::resolver::{self, ZoneConfig, ZoneConfigPartial};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ZoneEntry {
    Bare(String),
    Full {
        id: String,
        #[serde(default)]
        config: ZoneConfigPartial,
    },
}

impl ZoneEntry {
    pub fn id(&self) -> &str {
        match self {
            ZoneEntry::Bare(id) => id,
            ZoneEntry::Full { id, .. } => id,
        }
    }

    pub fn config(&self) -> Option<&ZoneConfigPartial> {
        match self {
            ZoneEntry::Bare(_) => None,
            ZoneEntry::Full { config, .. } => Some(config),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FarmEntry {
    pub id: String,
    #[serde(default)]
    pub config: ZoneConfigPartial,
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Topology {
    #[serde(default)]
    pub defaults: ZoneConfigPartial,
    #[serde(default)]
    pub farms: Vec<FarmEntry>,
}

impl Topology {
    /// Every `(farm_id, zone_id)` pair currently declared, in file order.
    pub fn zone_keys(&self) -> Vec<(String, String)> {
        self.farms
            .iter()
            .flat_map(|farm| {
                farm.zones
                    .iter()
                    .map(move |zone| (farm.id.clone(), zone.id().to_string()))
            })
            .collect()
    }

    pub fn farm(&self, farm_id: &str) -> Option<&FarmEntry> {
        self.farms.iter().find(|f| f.id == farm_id)
    }

    pub fn zone<'a>(&'a self, farm_id: &str, zone_id: &str) -> Option<&'a ZoneEntry> {
        self.farm(farm_id)?.zones.iter().find(|z| z.id() == zone_id)
    }

    /// Resolve the final `ZoneConfig` for one zone, falling back to an empty
    /// override set at any scope where the farm or zone is missing entirely
    /// (e.g. a zone added to the broker before the topology file catches up),
    /// or where the zone is declared as a bare string with no `config`
    /// subtree of its own (`common/config.py:36`).
    pub fn resolve(&self, farm_id: &str, zone_id: &str) -> ZoneConfig {
        let empty = ZoneConfigPartial::default();
        let farm_config = self.farm(farm_id).map(|f| &f.config).unwrap_or(&empty);
        let zone_config = self
            .zone(farm_id, zone_id)
            .and_then(|z| z.config())
            .unwrap_or(&empty);
        resolver::resolve(zone_config, farm_config, &self.defaults)
    }
}

/// Parse a topology document from disk. The on-disk format is JSON
/// (`system_config.json`, `common/config.py:13`'s `load_system_config`), not
/// TOML — the field layout is unaffected, only the serde data format.
pub fn load(path: &Path) -> Result<Topology> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading topology file {}", path.display()))?;
    let topology: Topology = serde_json::from_str(&raw)
        .with_context(|| format!("parsing topology file {}", path.display()))?;
    Ok(topology)
}

/// Tracks a topology file's last-modified time so a long-running process
/// can poll for edits instead of watching the filesystem, mirroring the
/// teacher's config-reload-by-mtime idiom used by the original planner
/// service's 5-second-throttled reload check.
pub struct HotReload {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
}

impl HotReload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_mtime: None,
        }
    }

    /// Returns `Ok(Some(topology))` if the file's mtime advanced since the
    /// last successful reload (or this is the first call), `Ok(None)` if
    /// unchanged. A parse error does not poison future polls.
    pub fn poll(&mut self) -> Result<Option<Topology>> {
        let metadata = std::fs::metadata(&self.path)
            .with_context(|| format!("stat topology file {}", self.path.display()))?;
        let mtime = metadata.modified().with_context(|| "reading mtime")?;
        if self.last_mtime == Some(mtime) {
            return Ok(None);
        }
        let topology = load(&self.path)?;
        self.last_mtime = Some(mtime);
        Ok(Some(topology))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_minimal_topology() {
        let file = write_temp(
            r#"{
                "farms": [
                    { "id": "farm-a", "zones": [ { "id": "zone-1" } ] }
                ]
            }"#,
        );
        let topology = load(file.path()).unwrap();
        assert_eq!(topology.zone_keys(), vec![("farm-a".into(), "zone-1".into())]);
    }

    #[test]
    fn bare_string_zone_inherits_farm_and_defaults_entirely() {
        let file = write_temp(
            r#"{
                "defaults": { "temp_setpoint": 25.0 },
                "farms": [
                    {
                        "id": "farm-a",
                        "config": { "co2_setpoint": 1400.0 },
                        "zones": [ "zone-1" ]
                    }
                ]
            }"#,
        );
        let topology = load(file.path()).unwrap();
        assert_eq!(topology.zone_keys(), vec![("farm-a".into(), "zone-1".into())]);
        let zone = topology.zone("farm-a", "zone-1").unwrap();
        assert!(zone.config().is_none());

        let resolved = topology.resolve("farm-a", "zone-1");
        assert_eq!(resolved.co2_setpoint, 1400.0);
        assert_eq!(resolved.temp_setpoint, 25.0);
    }

    #[test]
    fn parses_overrides_at_every_scope() {
        let file = write_temp(
            r#"{
                "defaults": { "temp_setpoint": 25.0 },
                "farms": [
                    {
                        "id": "farm-a",
                        "config": { "co2_setpoint": 1400.0 },
                        "zones": [
                            { "id": "zone-1", "config": { "temp_setpoint": 22.0 } }
                        ]
                    }
                ]
            }"#,
        );
        let topology = load(file.path()).unwrap();
        assert_eq!(topology.defaults.temp_setpoint, Some(25.0));
        let farm = topology.farm("farm-a").unwrap();
        assert_eq!(farm.config.co2_setpoint, Some(1400.0));
        let zone = topology.zone("farm-a", "zone-1").unwrap();
        assert_eq!(zone.config().unwrap().temp_setpoint, Some(22.0));

        let resolved = topology.resolve("farm-a", "zone-1");
        assert_eq!(resolved.temp_setpoint, 22.0);
        assert_eq!(resolved.co2_setpoint, 1400.0);
    }

    #[test]
    fn resolve_for_unknown_zone_falls_back_to_defaults() {
        let file = write_temp(r#"{ "defaults": { "temp_setpoint": 25.0 } }"#);
        let topology = load(file.path()).unwrap();
        let resolved = topology.resolve("missing-farm", "missing-zone");
        assert_eq!(resolved.temp_setpoint, 25.0);
    }

    #[test]
    fn empty_topology_has_no_zones() {
        let file = write_temp("{}");
        let topology = load(file.path()).unwrap();
        assert!(topology.zone_keys().is_empty());
    }

    #[test]
    fn hot_reload_detects_touch_only_on_change() {
        let file = write_temp(
            r#"{
                "farms": [
                    { "id": "farm-a", "zones": [ { "id": "zone-1" } ] }
                ]
            }"#,
        );
        let mut reload = HotReload::new(file.path());
        assert!(reload.poll().unwrap().is_some());
        assert!(reload.poll().unwrap().is_none());
    }
}
