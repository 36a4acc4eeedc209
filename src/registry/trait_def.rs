//! 服务注册发现 Trait 定义

use async_trait::async_trait;

use super::instance::ServiceInstance;
use crate::error::Result;

/// 服务注册
#[async_trait]
pub trait Registrar: Send + Sync {
    /// 注册服务实例
    ///
    /// 重复注册同一 ID 的实例由后端决定是否覆盖。
    async fn register(&self, instance: &ServiceInstance) -> Result<()>;
}

/// 服务发现
#[async_trait]
pub trait Discovery: Send + Sync {
    /// 获取指定服务名的所有实例
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>>;
}

/// 同时支持注册和发现的注册中心
pub trait Registry: Registrar + Discovery {}

impl<T: Registrar + Discovery + ?Sized> Registry for T {}
