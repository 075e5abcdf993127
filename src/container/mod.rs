pub mod docker;
pub mod lease;
pub mod ports;
pub mod runtime;

pub use docker::DockerRuntime;
pub use lease::ContainerLease;
pub use ports::{PortAllocator, PortLease};
pub use runtime::{health_poll, ContainerHandle, ContainerRuntime, ContainerSpec, PortMapping, VolumeMount};
