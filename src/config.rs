use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{DriverError, Result};

/// 驱动配置
///
/// 所有字段都有默认值，默认值即注册行为本身（etcd lease 15 秒，Consul 健康检查间隔 10、
/// 心跳开启、超时 20 秒）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverConfig {
    pub etcd: EtcdConfig,
    pub consul: ConsulConfig,
    pub resolver: ResolverConfig,
    pub instance: InstanceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EtcdConfig {
    /// 服务实例 key 前缀
    pub key_prefix: String,
    /// lease TTL（秒）
    pub lease_ttl_secs: i64,
    /// 连接超时（秒）
    pub dial_timeout_secs: u64,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            key_prefix: "/microservices".to_string(),
            lease_ttl_secs: 15,
            dial_timeout_secs: 5,
        }
    }
}

impl EtcdConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsulConfig {
    /// 是否为每个 endpoint 注册 TCP 健康检查
    pub health_check: bool,
    /// 健康检查 / 心跳间隔（秒）
    pub health_check_interval: u64,
    /// 是否注册 TTL 检查并定期上报心跳
    pub heartbeat: bool,
    /// 请求 Consul agent 的超时（秒）
    pub timeout_secs: u64,
    /// 检查持续 critical 多久后由 Consul 注销实例（秒）
    pub deregister_critical_after_secs: u64,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            health_check: true,
            health_check_interval: 10,
            heartbeat: true,
            timeout_secs: 20,
            deregister_critical_after_secs: 600,
        }
    }
}

impl ConsulConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// discovery 解析器只接受明文 grpc:// endpoint
    pub insecure: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { insecure: true }
    }
}

/// 注册实例的附加信息
///
/// etcd 中写入实例文档；Consul 中版本写为 `version=<版本>` 标签，元数据写入 Meta。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub version: String,
    pub metadata: HashMap<String, String>,
}

impl DriverConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("read {}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DriverError::Config(e.to_string()))
    }
}
