//! gRPC 客户端模块
//!
//! 将 `parse_server_method` 得到的 server 拨号为 `tonic` Channel：
//! scheme 已安装解析器时（如 `discovery:///svc.order`、`direct:///a:1,b:2`）
//! 先解析出地址列表再做负载均衡，否则直接拨号。

use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::driver::uri::TargetUri;
use crate::error::{DriverError, Result};
use crate::resolver;

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:50051".to_string(),
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

/// 客户端构建器
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn build(self) -> Result<Channel> {
        let address = self.config.address.as_str();
        let builder = TargetUri::parse(address)
            .ok()
            .and_then(|target| resolver::get(&target.scheme).map(|builder| (target, builder)));

        let Some((target, builder)) = builder else {
            return self.endpoint(address)?.connect().await.map_err(|e| DriverError::Connect(e.into()));
        };

        let addrs = builder.build(&target)?.resolve().await?;
        if addrs.is_empty() {
            return Err(DriverError::resolver(format!("no endpoint resolved for {}", address)));
        }
        debug!(target = %address, addrs = ?addrs, "Resolved target");

        let endpoints = addrs
            .iter()
            .map(|addr| self.endpoint(addr))
            .collect::<Result<Vec<_>>>()?;
        Ok(Channel::balance_list(endpoints.into_iter()))
    }

    fn endpoint(&self, addr: &str) -> Result<Endpoint> {
        let uri = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        let endpoint = Endpoint::from_shared(uri).map_err(|e| DriverError::Connect(e.into()))?;
        Ok(endpoint
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.timeout))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
