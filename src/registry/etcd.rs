//! etcd 服务注册发现实现
//!
//! 实例写在 `<prefix>/<服务名>/<实例ID>`，绑定一个 lease，并由后台任务持续续期。
//! lease 丢失后后台任务重新申请 lease 并写回 key；注册中心对象被丢弃时续期任务随之停止。

use async_trait::async_trait;
use etcd_client::{
    Client, ConnectOptions, GetOptions, LeaseKeepAliveStream, LeaseKeeper, PutOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::instance::ServiceInstance;
use super::liveness::{LeaseSession, RetryBackoff, spawn_keep_alive};
use super::trait_def::{Discovery, Registrar, Registry};
use super::{BackendFactory, BackendKind, BackendOptions};
use crate::config::EtcdConfig;
use crate::error::{BackendError, DriverError, Result};

/// etcd 后端参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtcdOptions {
    pub key_prefix: String,
    pub lease_ttl: i64,
    pub dial_timeout: Duration,
}

impl Default for EtcdOptions {
    fn default() -> Self {
        Self::from(&EtcdConfig::default())
    }
}

impl From<&EtcdConfig> for EtcdOptions {
    fn from(config: &EtcdConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.trim_end_matches('/').to_string(),
            lease_ttl: config.lease_ttl_secs,
            dial_timeout: config.dial_timeout(),
        }
    }
}

/// 服务前缀，末尾带 '/' 避免 `svc` 匹配到 `svc2`
pub fn service_prefix(key_prefix: &str, name: &str) -> String {
    format!("{}/{}/", key_prefix, name)
}

/// 实例 key
pub fn service_key(key_prefix: &str, name: &str, id: &str) -> String {
    format!("{}/{}/{}", key_prefix, name, id)
}

/// etcd 服务注册发现
pub struct EtcdRegistry {
    client: Client,
    options: EtcdOptions,
    keep_alive_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl EtcdRegistry {
    /// 连接 etcd 集群
    pub async fn connect(endpoints: &[String], options: EtcdOptions) -> Result<Self> {
        let connect_options = ConnectOptions::new().with_connect_timeout(options.dial_timeout);
        let client = Client::connect(endpoints, Some(connect_options))
            .await
            .map_err(|e| DriverError::Connect(e.into()))?;

        info!(endpoints = ?endpoints, "Connected to etcd");
        Ok(Self::new(client, options))
    }

    /// 使用已有客户端创建注册中心
    pub fn new(client: Client, options: EtcdOptions) -> Self {
        Self {
            client,
            options,
            keep_alive_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &EtcdOptions {
        &self.options
    }
}

/// 一个实例的 etcd lease
///
/// 续期失败（lease 过期、stream 关闭、etcd 重启）后重新申请 lease 并写回 key。
struct EtcdLease {
    client: Client,
    key: String,
    value: String,
    ttl: i64,
    lease_id: i64,
    keeper: Option<(LeaseKeeper, LeaseKeepAliveStream)>,
}

impl EtcdLease {
    fn new(client: Client, key: String, value: String, ttl: i64) -> Self {
        Self {
            client,
            key,
            value,
            ttl,
            lease_id: 0,
            keeper: None,
        }
    }
}

#[async_trait]
impl LeaseSession for EtcdLease {
    async fn renew(&mut self) -> Result<()> {
        // 出错时 keeper 被丢弃，下次重新打开
        let (mut keeper, mut stream) = match self.keeper.take() {
            Some(pair) => pair,
            None => self
                .client
                .lease_keep_alive(self.lease_id)
                .await
                .map_err(|e| DriverError::Register(e.into()))?,
        };

        keeper
            .keep_alive()
            .await
            .map_err(|e| DriverError::Register(e.into()))?;
        match stream
            .message()
            .await
            .map_err(|e| DriverError::Register(e.into()))?
        {
            Some(resp) if resp.ttl() > 0 => {
                self.keeper = Some((keeper, stream));
                Ok(())
            }
            _ => Err(DriverError::Register(BackendError::LeaseExpired(self.lease_id))),
        }
    }

    async fn reestablish(&mut self) -> Result<()> {
        self.keeper = None;
        let lease = self
            .client
            .lease_grant(self.ttl, None)
            .await
            .map_err(|e| DriverError::Register(e.into()))?;

        self.client
            .put(
                self.key.as_str(),
                self.value.as_str(),
                Some(PutOptions::new().with_lease(lease.id())),
            )
            .await
            .map_err(|e| DriverError::Register(e.into()))?;

        self.lease_id = lease.id();
        Ok(())
    }
}

#[async_trait]
impl Registrar for EtcdRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let key = service_key(&self.options.key_prefix, &instance.name, &instance.id);
        let value = serde_json::to_string(instance).map_err(|e| DriverError::Register(e.into()))?;

        let mut lease = EtcdLease::new(self.client.clone(), key.clone(), value, self.options.lease_ttl);
        lease.reestablish().await?;

        info!(
            service = %instance.name,
            instance_id = %instance.id,
            key = %key,
            lease_id = lease.lease_id,
            "Service registered in etcd"
        );

        let period = Duration::from_secs((self.options.lease_ttl / 3).max(1) as u64);
        let handle = spawn_keep_alive(lease, period, RetryBackoff::default(), instance.id.clone());
        self.keep_alive_handles.lock().await.push(handle);
        Ok(())
    }
}

#[async_trait]
impl Discovery for EtcdRegistry {
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let mut client = self.client.clone();
        let prefix = service_prefix(&self.options.key_prefix, name);
        let resp = client
            .get(prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| DriverError::Discover(e.into()))?;

        let mut instances = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            match serde_json::from_slice::<ServiceInstance>(kv.value()) {
                Ok(instance) => instances.push(instance),
                Err(e) => {
                    warn!(
                        key = %String::from_utf8_lossy(kv.key()),
                        error = %e,
                        "Skipping undecodable service instance"
                    );
                }
            }
        }

        Ok(instances)
    }
}

impl Drop for EtcdRegistry {
    fn drop(&mut self) {
        for handle in self.keep_alive_handles.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// etcd 后端工厂
#[derive(Debug, Clone, Default)]
pub struct EtcdFactory {
    options: EtcdOptions,
}

impl EtcdFactory {
    pub fn new(options: EtcdOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BackendFactory for EtcdFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Etcd
    }

    fn options(&self) -> BackendOptions {
        BackendOptions::Etcd(self.options.clone())
    }

    async fn build(&self, hosts: &[String]) -> Result<Arc<dyn Registry>> {
        let registry = EtcdRegistry::connect(hosts, self.options.clone()).await?;
        Ok(Arc::new(registry))
    }
}
