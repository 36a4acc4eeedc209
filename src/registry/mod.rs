//! 服务注册发现模块
//!
//! 支持 etcd 和 Consul 两种注册中心后端，按注册目标的 scheme 选择：
//! `discovery://` 与 `etcd://` 使用 etcd，`consul://` 使用 Consul。

pub mod consul;
pub mod etcd;
pub mod instance;
pub(crate) mod liveness;
pub mod trait_def;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{DriverError, Result};
pub use consul::{ConsulFactory, ConsulOptions, ConsulRegistry};
pub use etcd::{EtcdFactory, EtcdOptions, EtcdRegistry};
pub use instance::ServiceInstance;
pub use trait_def::{Discovery, Registrar, Registry};

/// 注册目标 scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `discovery://`，默认 scheme，使用 etcd
    Discovery,
    /// `etcd://`
    Etcd,
    /// `consul://`
    Consul,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Discovery => "discovery",
            Scheme::Etcd => "etcd",
            Scheme::Consul => "consul",
        }
    }

    /// scheme 对应的注册中心后端
    pub fn backend(&self) -> BackendKind {
        match self {
            Scheme::Discovery | Scheme::Etcd => BackendKind::Etcd,
            Scheme::Consul => BackendKind::Consul,
        }
    }
}

impl FromStr for Scheme {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "discovery" => Ok(Scheme::Discovery),
            "etcd" => Ok(Scheme::Etcd),
            "consul" => Ok(Scheme::Consul),
            _ => Err(DriverError::UnknownScheme(s.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 注册中心后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Etcd,
    Consul,
}

/// 后端参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOptions {
    Etcd(EtcdOptions),
    Consul(ConsulOptions),
}

/// 后端工厂
///
/// 每次注册都通过工厂创建新的客户端和注册中心对象。
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// 工厂负责的后端类型
    fn kind(&self) -> BackendKind;

    /// 创建注册中心时使用的参数
    fn options(&self) -> BackendOptions;

    /// 连接 `hosts` 并创建注册中心
    async fn build(&self, hosts: &[String]) -> Result<Arc<dyn Registry>>;
}

/// 一次成功注册的句柄
///
/// 持有注册中心对象：etcd lease 续期和 Consul 心跳都依赖它存活。
#[derive(Clone)]
pub struct RegistrationHandle {
    scheme: Scheme,
    instance: ServiceInstance,
    registry: Arc<dyn Registry>,
}

impl RegistrationHandle {
    pub fn new(scheme: Scheme, instance: ServiceInstance, registry: Arc<dyn Registry>) -> Self {
        Self {
            scheme,
            instance,
            registry,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// 已注册的服务实例
    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    /// 注册所用的注册中心
    pub fn registry(&self) -> Arc<dyn Registry> {
        self.registry.clone()
    }
}

impl fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("scheme", &self.scheme)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}
