//! 服务实例定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 服务实例
///
/// 序列化后的 JSON 即写入注册中心的文档：
/// `{"id":..,"name":..,"version":..,"metadata":{..},"endpoints":[..]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInstance {
    /// 实例 ID（`<服务名>_<主机名>`）
    pub id: String,

    /// 服务名
    pub name: String,

    /// 版本
    #[serde(default)]
    pub version: String,

    /// 元数据
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// 对外公布的地址，顺序与注册时一致
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl ServiceInstance {
    /// 创建新的服务实例
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            metadata: HashMap::new(),
            endpoints,
        }
    }

    /// 由服务名、主机名和逗号分隔的 endpoint 列表构建实例
    pub fn from_endpoint_list(name: &str, hostname: &str, endpoint: &str) -> Self {
        Self::new(
            instance_id(name, hostname),
            name,
            endpoint.split(',').map(str::to_string).collect(),
        )
    }

    /// 设置版本
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 实例 ID：同一主机上相同服务名得到相同 ID
pub fn instance_id(name: &str, hostname: &str) -> String {
    format!("{}_{}", name, hostname)
}

/// 拆分 endpoint 为 (scheme, host:port)
///
/// `grpc://10.0.0.1:9000?isSecure=false` → `(Some("grpc"), "10.0.0.1:9000")`，
/// `10.0.0.1:9000` → `(None, "10.0.0.1:9000")`
pub fn split_endpoint(endpoint: &str) -> (Option<&str>, &str) {
    let (scheme, rest) = match endpoint.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, endpoint),
    };
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    (scheme, &rest[..end])
}

/// 拆分 `host:port`，IPv6 地址去掉方括号
pub fn host_port(addr: &str) -> Option<(&str, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Some((host, port))
}
