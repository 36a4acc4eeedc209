//! `discovery:///<服务名>` 解析器：通过注册中心查询服务实例

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::{Resolver, ResolverBuilder};
use crate::driver::uri::TargetUri;
use crate::error::{DriverError, Result};
use crate::registry::Registry;
use crate::registry::instance::{ServiceInstance, split_endpoint};

pub const DISCOVERY_SCHEME: &str = "discovery";

/// 由注册中心派生的解析器构建器
#[derive(Clone)]
pub struct DiscoveryBuilder {
    registry: Arc<dyn Registry>,
    insecure: bool,
}

impl DiscoveryBuilder {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            insecure: false,
        }
    }

    /// 只接受明文 `grpc://` endpoint（否则只接受 `grpcs://`）
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }
}

impl ResolverBuilder for DiscoveryBuilder {
    fn scheme(&self) -> &str {
        DISCOVERY_SCHEME
    }

    fn build(&self, target: &TargetUri) -> Result<Box<dyn Resolver>> {
        let name = target.service_name();
        if name.is_empty() {
            return Err(DriverError::resolver(format!("no service name in {}", target)));
        }
        Ok(Box::new(DiscoveryResolver {
            registry: self.registry.clone(),
            name: name.to_string(),
            insecure: self.insecure,
        }))
    }
}

struct DiscoveryResolver {
    registry: Arc<dyn Registry>,
    name: String,
    insecure: bool,
}

#[async_trait]
impl Resolver for DiscoveryResolver {
    async fn resolve(&self) -> Result<Vec<String>> {
        let instances = self.registry.get_service(&self.name).await?;
        let addrs = select_endpoints(&instances, self.insecure);
        if addrs.is_empty() {
            warn!(service = %self.name, instances = instances.len(), "Zero endpoint found");
        }
        Ok(addrs)
    }
}

/// 从实例中挑选可拨号的地址，保持顺序并去重
///
/// 带 scheme 的 endpoint 只保留 `grpc`（insecure）或 `grpcs`，裸地址总是保留。
fn select_endpoints(instances: &[ServiceInstance], insecure: bool) -> Vec<String> {
    let wanted = if insecure { "grpc" } else { "grpcs" };
    let mut addrs: Vec<String> = Vec::new();
    for endpoint in instances.iter().flat_map(|instance| &instance.endpoints) {
        let (scheme, addr) = split_endpoint(endpoint);
        if scheme.is_some_and(|s| s != wanted) || addr.is_empty() {
            continue;
        }
        if !addrs.iter().any(|a| a == addr) {
            addrs.push(addr.to_string());
        }
    }
    addrs
}
