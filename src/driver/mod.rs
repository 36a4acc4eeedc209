//! DTM 驱动接口
//!
//! 协调器通过驱动名找到驱动，启动时调用 `register_service` 注册自身，
//! 拨号前调用 `parse_server_method` 拆分调用地址。

pub mod kratos;
pub mod uri;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::error::Result;
pub use kratos::{DRIVER_NAME, KratosDriver, KratosDriverBuilder};
pub use uri::{TargetUri, parse_server_method};

/// 驱动接口
#[async_trait]
pub trait Driver: Send + Sync {
    /// 驱动名
    fn name(&self) -> &str;

    /// 安装地址解析器
    fn register_address_resolver(&self);

    /// 将本服务注册到 `target` 指定的注册中心
    ///
    /// `target` 为空时直接返回成功；`endpoint` 是逗号分隔的对外地址。
    async fn register_service(&self, target: &str, endpoint: &str) -> Result<()>;

    /// 将调用地址拆分为 `(server, method)`
    fn parse_server_method(&self, uri: &str) -> Result<(String, String)>;
}

static DRIVERS: LazyLock<RwLock<HashMap<String, Arc<dyn Driver>>>> = LazyLock::new(|| {
    let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();
    drivers.insert(DRIVER_NAME.to_string(), Arc::new(KratosDriver::default()));
    RwLock::new(drivers)
});

/// 注册驱动，同名驱动会被替换
pub fn register_driver(driver: Arc<dyn Driver>) {
    let name = driver.name().to_string();
    debug!(driver = %name, "Driver registered");
    DRIVERS.write().insert(name, driver);
}

/// 按名称查找驱动
pub fn get_driver(name: &str) -> Option<Arc<dyn Driver>> {
    DRIVERS.read().get(name).cloned()
}

/// 已注册的驱动名（排序后）
pub fn driver_names() -> Vec<String> {
    let mut names: Vec<String> = DRIVERS.read().keys().cloned().collect();
    names.sort();
    names
}
