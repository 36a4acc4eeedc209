//! DTM Kratos Driver
//!
//! Registers a participating service in etcd or Consul and installs a `discovery`
//! name resolver, so transaction-control URIs such as `discovery:///svc.order/Create`
//! can be dialed through the same registry.

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod utils;

// Re-exports
pub use config::{ConsulConfig, DriverConfig, EtcdConfig, InstanceConfig, ResolverConfig};
pub use driver::{
    DRIVER_NAME, Driver, KratosDriver, KratosDriverBuilder, TargetUri, driver_names, get_driver,
    parse_server_method, register_driver,
};
pub use error::{BackendError, DriverError, ErrorCategory, ErrorCode, Result};

// 注册中心相关 re-exports
pub use registry::{
    BackendFactory, BackendKind, BackendOptions, ConsulFactory, ConsulOptions, ConsulRegistry,
    Discovery, EtcdFactory, EtcdOptions, EtcdRegistry, Registrar, RegistrationHandle, Registry,
    Scheme, ServiceInstance,
};
pub use resolver::{DirectBuilder, DiscoveryBuilder, Resolver, ResolverBuilder};

// 工具 re-exports
pub use client::{ClientBuilder, ClientConfig};
pub use utils::{HostProbe, SystemProbe, hostname, local_ip};
