//! Gateways: the boundary between the rollout engine and the outside world.

pub mod metrics;
pub mod route;
pub mod store;
pub mod workload;

pub use metrics::{MetricsError, MetricsGateway};
pub use route::{Destination, RouteError, RouteGateway};
pub use store::{CanaryStore, StoreError};
pub use workload::{Workload, WorkloadError, WorkloadGateway};
