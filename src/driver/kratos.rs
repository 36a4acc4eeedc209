//! Kratos 风格注册中心驱动
//!
//! 注册目标 `scheme://hosts/<服务名>`：
//! - `discovery://`、`etcd://`：hosts 为逗号分隔的 etcd 地址
//! - `consul://`：hosts 为 Consul agent 地址
//!
//! 每次注册都新建后端客户端，先安装 `discovery` 解析器再注册实例。
//! 注册句柄由驱动保留到进程退出，后端的续期 / 心跳依赖它存活。

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Driver;
use super::uri::{TargetUri, parse_server_method};
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::registry::{
    BackendFactory, BackendKind, ConsulFactory, ConsulOptions, EtcdFactory, EtcdOptions,
    RegistrationHandle, Scheme, ServiceInstance,
};
use crate::resolver::{self, DiscoveryBuilder};
use crate::utils::net::{HostProbe, SystemProbe, rewrite_localhost};

/// 驱动名
pub const DRIVER_NAME: &str = "dtm-driver-kratos";

/// Kratos 驱动
pub struct KratosDriver {
    config: DriverConfig,
    probe: Arc<dyn HostProbe>,
    factories: HashMap<BackendKind, Arc<dyn BackendFactory>>,
    registrations: Mutex<Vec<RegistrationHandle>>,
}

impl KratosDriver {
    /// 使用指定配置创建驱动
    pub fn new(config: DriverConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> KratosDriverBuilder {
        KratosDriverBuilder::default()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 至今成功的注册
    pub fn registrations(&self) -> Vec<RegistrationHandle> {
        self.registrations.lock().clone()
    }

    /// 根据注册目标和 endpoint 列表构建服务实例
    ///
    /// 实例 ID 为 `<服务名>_<主机名>`；endpoint 中的 `localhost` 会被替换为本机 IP，
    /// 版本和元数据取自 `[instance]` 配置。
    pub fn build_instance(&self, target: &TargetUri, endpoint: &str) -> ServiceInstance {
        let endpoint = rewrite_localhost(endpoint, self.probe.as_ref());
        let instance =
            ServiceInstance::from_endpoint_list(target.service_name(), &self.probe.hostname(), &endpoint)
                .with_version(self.config.instance.version.as_str());
        self.config
            .instance
            .metadata
            .iter()
            .fold(instance, |instance, (key, value)| {
                instance.with_metadata(key.as_str(), value.as_str())
            })
    }

    /// 注册服务，可由调用方取消
    ///
    /// `target` 为空时不做任何事并返回 `Ok(None)`。取消发生在后端构建或注册期间时返回
    /// [`DriverError::Cancelled`]，已安装的解析器保留。
    pub async fn register_service_with_cancel(
        &self,
        target: &str,
        endpoint: &str,
        cancel: CancellationToken,
    ) -> Result<Option<RegistrationHandle>> {
        if target.is_empty() {
            debug!("Empty registry target, service registration skipped");
            return Ok(None);
        }

        let uri = TargetUri::parse(target)?;
        let instance = self.build_instance(&uri, endpoint);
        let scheme: Scheme = uri.scheme.parse()?;
        let factory = self
            .factories
            .get(&scheme.backend())
            .ok_or_else(|| DriverError::UnknownScheme(uri.scheme.clone()))?;

        let hosts = uri.hosts();
        let registry = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DriverError::Cancelled),
            registry = factory.build(&hosts) => registry?,
        };

        // 安装解析器，使协调器可以拨号 discovery:///<服务名>
        let builder = DiscoveryBuilder::new(registry.clone()).with_insecure(self.config.resolver.insecure);
        resolver::register(Arc::new(builder));
        info!(scheme = %scheme, hosts = %uri.host, "🔌 Discovery resolver installed");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DriverError::Cancelled),
            registered = registry.register(&instance) => registered?,
        }

        info!(
            scheme = %scheme,
            service = %instance.name,
            instance_id = %instance.id,
            endpoints = ?instance.endpoints,
            "✅ Service registered"
        );

        let handle = RegistrationHandle::new(scheme, instance, registry);
        self.registrations.lock().push(handle.clone());
        Ok(Some(handle))
    }
}

impl Default for KratosDriver {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for KratosDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KratosDriver")
            .field("config", &self.config)
            .field("registrations", &self.registrations.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Driver for KratosDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn register_address_resolver(&self) {}

    async fn register_service(&self, target: &str, endpoint: &str) -> Result<()> {
        match self
            .register_service_with_cancel(target, endpoint, CancellationToken::new())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(
                    registry = %target,
                    code = %e.code(),
                    category = %e.category(),
                    error = %e,
                    "⚠️ Service registration failed"
                );
                Err(e)
            }
        }
    }

    fn parse_server_method(&self, uri: &str) -> Result<(String, String)> {
        parse_server_method(uri)
    }
}

/// 驱动构建器
#[derive(Default)]
pub struct KratosDriverBuilder {
    config: DriverConfig,
    probe: Option<Arc<dyn HostProbe>>,
    factories: HashMap<BackendKind, Arc<dyn BackendFactory>>,
}

impl KratosDriverBuilder {
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// 替换主机探测器
    pub fn probe(mut self, probe: Arc<dyn HostProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// 替换某类后端的工厂
    pub fn factory(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.factories.insert(factory.kind(), factory);
        self
    }

    /// 未指定的后端使用配置生成的默认工厂
    pub fn build(self) -> KratosDriver {
        let mut factories = self.factories;
        factories
            .entry(BackendKind::Etcd)
            .or_insert_with(|| Arc::new(EtcdFactory::new(EtcdOptions::from(&self.config.etcd))));
        factories
            .entry(BackendKind::Consul)
            .or_insert_with(|| Arc::new(ConsulFactory::new(ConsulOptions::from(&self.config.consul))));

        KratosDriver {
            config: self.config,
            probe: self.probe.unwrap_or_else(|| Arc::new(SystemProbe)),
            factories,
            registrations: Mutex::new(Vec::new()),
        }
    }
}
