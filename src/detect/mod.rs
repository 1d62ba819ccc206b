mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{DetectionCapability, SensorBackend, VisionBackend};
pub use backends::{StubBackend, StubSensor};
pub use registry::{BackendRegistry, Resource};
pub use result::{Classification, Detection};
