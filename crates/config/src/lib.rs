pub mod resolver;
pub mod topology;

pub use resolver::{resolve, ZoneConfig, ZoneConfigPartial};
pub use topology::{load, FarmEntry, HotReload, Topology, ZoneEntry};
