//! 名称解析模块
//!
//! 进程级的 `scheme → ResolverBuilder` 注册表。这是一个刻意保留的全局状态：
//! 注册服务时安装的 `discovery` 解析器要对之后所有拨号生效。
//! 同一 scheme 重复注册时后写入者生效，因此同一进程内不要混用 etcd 和 Consul 注册。
//!
//! `direct` 解析器在首次访问时即已存在，裸地址无需服务发现也能拨通。

pub mod direct;
pub mod discovery;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::driver::uri::TargetUri;
use crate::error::{DriverError, Result};
pub use direct::{DIRECT_SCHEME, DirectBuilder};
pub use discovery::{DISCOVERY_SCHEME, DiscoveryBuilder};

/// 解析器：给出目标当前的地址列表（`host:port`）
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self) -> Result<Vec<String>>;
}

/// 解析器构建器
pub trait ResolverBuilder: Send + Sync {
    /// 负责的 scheme
    fn scheme(&self) -> &str;

    /// 为目标创建解析器
    fn build(&self, target: &TargetUri) -> Result<Box<dyn Resolver>>;
}

type BuilderMap = HashMap<String, Arc<dyn ResolverBuilder>>;

static RESOLVERS: LazyLock<RwLock<BuilderMap>> = LazyLock::new(|| RwLock::new(builtin()));

fn builtin() -> BuilderMap {
    let mut builders: BuilderMap = HashMap::new();
    builders.insert(DIRECT_SCHEME.to_string(), Arc::new(DirectBuilder));
    builders
}

/// 安装解析器构建器，覆盖同一 scheme 的旧构建器
pub fn register(builder: Arc<dyn ResolverBuilder>) {
    let scheme = builder.scheme().to_string();
    debug!(scheme = %scheme, "Resolver builder registered");
    RESOLVERS.write().insert(scheme, builder);
}

/// 查找 scheme 对应的构建器
pub fn get(scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
    RESOLVERS.read().get(scheme).cloned()
}

/// 已安装的 scheme（排序后）
pub fn schemes() -> Vec<String> {
    let mut schemes: Vec<String> = RESOLVERS.read().keys().cloned().collect();
    schemes.sort();
    schemes
}

/// 清空注册表，只保留内置的 `direct` 解析器（测试使用）
pub fn reset() {
    *RESOLVERS.write() = builtin();
}

/// 通过已安装的构建器解析 `target`
pub async fn resolve(target: &str) -> Result<Vec<String>> {
    let target = TargetUri::parse(target)?;
    let builder = get(&target.scheme).ok_or_else(|| {
        DriverError::resolver(format!("no resolver registered for scheme {:?}", target.scheme))
    })?;
    builder.build(&target)?.resolve().await
}

#[cfg(test)]
pub(crate) static TEST_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedBuilder(&'static str, &'static str);

    struct FixedResolver(&'static str);

    #[async_trait]
    impl Resolver for FixedResolver {
        async fn resolve(&self) -> Result<Vec<String>> {
            Ok(vec![self.0.to_string()])
        }
    }

    impl ResolverBuilder for NamedBuilder {
        fn scheme(&self) -> &str {
            self.0
        }

        fn build(&self, _target: &TargetUri) -> Result<Box<dyn Resolver>> {
            Ok(Box::new(FixedResolver(self.1)))
        }
    }

    #[tokio::test]
    async fn test_direct_is_builtin() {
        let _guard = TEST_LOCK.lock().await;
        reset();
        assert_eq!(schemes(), vec!["direct"]);
        assert_eq!(
            resolve("direct:///127.0.0.1:9000").await.unwrap(),
            vec!["127.0.0.1:9000"]
        );
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let _guard = TEST_LOCK.lock().await;
        reset();
        register(Arc::new(NamedBuilder("static", "10.0.0.1:1")));
        register(Arc::new(NamedBuilder("static", "10.0.0.2:2")));

        assert_eq!(resolve("static:///svc").await.unwrap(), vec!["10.0.0.2:2"]);
        assert_eq!(schemes(), vec!["direct", "static"]);

        reset();
        assert!(get("static").is_none());
        assert!(get(DIRECT_SCHEME).is_some());
    }

    #[tokio::test]
    async fn test_unknown_scheme_fails() {
        let _guard = TEST_LOCK.lock().await;
        reset();
        let err = resolve("nowhere:///svc").await.unwrap_err();
        assert!(matches!(err, DriverError::Resolver(_)));
    }
}
