pub mod registry;
pub mod scan;
pub mod snapshot;
pub mod worker;

pub use registry::{LoadedConfigs, NotificationRegistry, CONFIG_LIST};
pub use scan::ScanStats;
pub use snapshot::SnapshotStore;
pub use worker::{FileMonitor, MonitorConfig, MonitorErrorCallback};
