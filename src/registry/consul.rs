//! Consul 服务注册发现实现
//!
//! 通过 agent HTTP API 注册实例：
//! - 开启健康检查时，为每个 endpoint 注册一个 TCP 检查
//! - 开启心跳时，注册 TTL 检查 `service:<实例ID>`（TTL 为间隔的 2 倍），
//!   并由后台任务每个间隔调用一次 `/v1/agent/check/pass/service:<实例ID>`；
//!   调用被拒绝时重新注册服务

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::instance::{ServiceInstance, host_port, split_endpoint};
use super::liveness::{LeaseSession, RetryBackoff, spawn_keep_alive};
use super::trait_def::{Discovery, Registrar, Registry};
use super::{BackendFactory, BackendKind, BackendOptions};
use crate::config::ConsulConfig;
use crate::error::{BackendError, DriverError, Result};

/// 未指定地址时 Consul agent 的默认地址
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8500";

/// 元数据中保存完整 endpoint 列表的键
const ENDPOINTS_META_KEY: &str = "endpoints";

/// Consul 后端参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsulOptions {
    pub health_check: bool,
    /// 健康检查 / 心跳间隔（秒）
    pub health_check_interval: u64,
    pub heartbeat: bool,
    pub timeout: Duration,
    /// 检查持续 critical 后注销实例的时间（秒）
    pub deregister_critical_after: u64,
}

impl Default for ConsulOptions {
    fn default() -> Self {
        Self::from(&ConsulConfig::default())
    }
}

impl From<&ConsulConfig> for ConsulOptions {
    fn from(config: &ConsulConfig) -> Self {
        Self {
            health_check: config.health_check,
            health_check_interval: config.health_check_interval,
            heartbeat: config.heartbeat,
            timeout: config.timeout(),
            deregister_critical_after: config.deregister_critical_after_secs,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AgentServiceRegistration {
    #[serde(rename = "ID")]
    id: String,
    name: String,
    tags: Vec<String>,
    meta: HashMap<String, String>,
    address: String,
    port: u16,
    checks: Vec<AgentServiceCheck>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AgentServiceCheck {
    #[serde(rename = "CheckID", skip_serializing_if = "Option::is_none")]
    check_id: Option<String>,
    #[serde(rename = "TCP", skip_serializing_if = "Option::is_none")]
    tcp: Option<String>,
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<String>,
    deregister_critical_service_after: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    service: AgentService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    meta: HashMap<String, String>,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u16,
}

/// TTL 检查 ID
pub fn ttl_check_id(instance_id: &str) -> String {
    format!("service:{}", instance_id)
}

/// 将 agent 地址转换为 base URL，没有 scheme 时使用 http
pub fn base_url(address: &str) -> String {
    let address = if address.is_empty() { DEFAULT_ADDRESS } else { address };
    if address.contains("://") {
        address.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Consul 服务注册发现
pub struct ConsulRegistry {
    http_client: HttpClient,
    base_url: String,
    options: ConsulOptions,
    heartbeat_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ConsulRegistry {
    /// 创建指向 `address` 的 Consul 客户端
    pub fn new(address: &str, options: ConsulOptions) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| DriverError::Connect(e.into()))?;

        Ok(Self {
            http_client,
            base_url: base_url(address),
            options,
            heartbeat_handles: Mutex::new(Vec::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ConsulOptions {
        &self.options
    }

    pub(crate) fn registration(&self, instance: &ServiceInstance) -> Result<AgentServiceRegistration> {
        let first = instance.endpoints.first().map(String::as_str).unwrap_or_default();
        let (_, addr) = split_endpoint(first);
        let (address, port) = host_port(addr).ok_or_else(|| {
            DriverError::invalid_uri(first, "endpoint has no host:port for consul registration")
        })?;

        let deregister_after = format!("{}s", self.options.deregister_critical_after);
        let mut checks = Vec::new();
        if self.options.health_check {
            for endpoint in &instance.endpoints {
                let (_, addr) = split_endpoint(endpoint);
                checks.push(AgentServiceCheck {
                    tcp: Some(addr.to_string()),
                    interval: Some(format!("{}s", self.options.health_check_interval)),
                    timeout: Some("5s".to_string()),
                    deregister_critical_service_after: deregister_after.clone(),
                    ..Default::default()
                });
            }
        }
        if self.options.heartbeat {
            checks.push(AgentServiceCheck {
                check_id: Some(ttl_check_id(&instance.id)),
                ttl: Some(format!("{}s", self.options.health_check_interval * 2)),
                deregister_critical_service_after: deregister_after,
                ..Default::default()
            });
        }

        let mut tags = Vec::new();
        if !instance.version.is_empty() {
            tags.push(format!("version={}", instance.version));
        }
        let mut meta = instance.metadata.clone();
        meta.insert(ENDPOINTS_META_KEY.to_string(), instance.endpoints.join(","));

        Ok(AgentServiceRegistration {
            id: instance.id.clone(),
            name: instance.name.clone(),
            tags,
            meta,
            address: address.to_string(),
            port,
            checks,
        })
    }
}

async fn check_status(resp: reqwest::Response) -> std::result::Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::Consul {
        status: status.as_u16(),
        body,
    })
}

async fn put_registration(
    http_client: &HttpClient,
    base_url: &str,
    payload: &AgentServiceRegistration,
) -> Result<()> {
    let url = format!("{}/v1/agent/service/register", base_url);
    let resp = http_client
        .put(&url)
        .json(payload)
        .send()
        .await
        .map_err(|e| DriverError::Register(e.into()))?;
    check_status(resp).await.map_err(DriverError::Register)?;
    Ok(())
}

/// TTL 检查心跳
///
/// agent 重启等原因导致 `check/pass` 被拒绝时，用保存的注册内容重新注册服务。
struct ConsulHeartbeat {
    http_client: HttpClient,
    base_url: String,
    pass_url: String,
    payload: AgentServiceRegistration,
}

#[async_trait]
impl LeaseSession for ConsulHeartbeat {
    async fn renew(&mut self) -> Result<()> {
        let resp = self
            .http_client
            .put(&self.pass_url)
            .send()
            .await
            .map_err(|e| DriverError::Register(e.into()))?;
        check_status(resp).await.map_err(DriverError::Register)?;
        Ok(())
    }

    async fn reestablish(&mut self) -> Result<()> {
        put_registration(&self.http_client, &self.base_url, &self.payload).await
    }
}

#[async_trait]
impl Registrar for ConsulRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let payload = self.registration(instance)?;
        put_registration(&self.http_client, &self.base_url, &payload).await?;

        info!(
            service = %instance.name,
            instance_id = %instance.id,
            address = %payload.address,
            port = payload.port,
            "Service registered in consul"
        );

        if self.options.heartbeat {
            let heartbeat = ConsulHeartbeat {
                http_client: self.http_client.clone(),
                base_url: self.base_url.clone(),
                pass_url: format!("{}/v1/agent/check/pass/{}", self.base_url, ttl_check_id(&instance.id)),
                payload,
            };
            // 第一次 tick 立即触发，注册后马上让 TTL 检查通过
            let period = Duration::from_secs(self.options.health_check_interval.max(1));
            let handle = spawn_keep_alive(heartbeat, period, RetryBackoff::default(), instance.id.clone());
            self.heartbeat_handles.lock().await.push(handle);
        }
        Ok(())
    }
}

#[async_trait]
impl Discovery for ConsulRegistry {
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>> {
        let url = format!("{}/v1/health/service/{}", self.base_url, name);
        let resp = self
            .http_client
            .get(&url)
            .query(&[("passing", "true")])
            .send()
            .await
            .map_err(|e| DriverError::Discover(e.into()))?;
        let entries: Vec<ServiceEntry> = check_status(resp)
            .await
            .map_err(DriverError::Discover)?
            .json()
            .await
            .map_err(|e| DriverError::Discover(e.into()))?;

        Ok(entries.into_iter().map(|entry| entry.service.into_instance()).collect())
    }
}

impl AgentService {
    fn into_instance(mut self) -> ServiceInstance {
        let endpoints = match self.meta.remove(ENDPOINTS_META_KEY) {
            Some(list) if !list.is_empty() => list.split(',').map(str::to_string).collect(),
            _ if !self.address.is_empty() && self.port != 0 => {
                vec![format!("{}:{}", self.address, self.port)]
            }
            _ => Vec::new(),
        };
        let version = self
            .tags
            .iter()
            .find_map(|tag| tag.strip_prefix("version="))
            .unwrap_or_default()
            .to_string();

        ServiceInstance {
            id: self.id,
            name: self.service,
            version,
            metadata: self.meta,
            endpoints,
        }
    }
}

impl Drop for ConsulRegistry {
    fn drop(&mut self) {
        for handle in self.heartbeat_handles.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Consul 后端工厂
#[derive(Debug, Clone, Default)]
pub struct ConsulFactory {
    options: ConsulOptions,
}

impl ConsulFactory {
    pub fn new(options: ConsulOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BackendFactory for ConsulFactory {
    fn kind(&self) -> BackendKind {
        BackendKind::Consul
    }

    fn options(&self) -> BackendOptions {
        BackendOptions::Consul(self.options.clone())
    }

    async fn build(&self, hosts: &[String]) -> Result<Arc<dyn Registry>> {
        if hosts.len() > 1 {
            warn!(hosts = ?hosts, "Consul accepts a single agent address, using the first one");
        }
        let address = hosts.first().map(String::as_str).unwrap_or_default();
        let registry = ConsulRegistry::new(address, self.options.clone())?;
        Ok(Arc::new(registry))
    }
}
