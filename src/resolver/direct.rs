//! `direct:///addr1,addr2` 解析器：地址直接写在路径里

use async_trait::async_trait;

use super::{Resolver, ResolverBuilder};
use crate::driver::uri::TargetUri;
use crate::error::{DriverError, Result};

pub const DIRECT_SCHEME: &str = "direct";

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectBuilder;

impl ResolverBuilder for DirectBuilder {
    fn scheme(&self) -> &str {
        DIRECT_SCHEME
    }

    fn build(&self, target: &TargetUri) -> Result<Box<dyn Resolver>> {
        let addrs: Vec<String> = target
            .service_name()
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect();
        if addrs.is_empty() {
            return Err(DriverError::resolver(format!("no address in {}", target)));
        }
        Ok(Box::new(StaticResolver { addrs }))
    }
}

struct StaticResolver {
    addrs: Vec<String>,
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self) -> Result<Vec<String>> {
        Ok(self.addrs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_addresses() {
        let target = TargetUri::parse("direct:///127.0.0.1:9000,127.0.0.2:9000").unwrap();
        let resolver = DirectBuilder.build(&target).unwrap();
        assert_eq!(
            resolver.resolve().await.unwrap(),
            vec!["127.0.0.1:9000", "127.0.0.2:9000"]
        );
    }

    #[test]
    fn test_direct_without_address() {
        let target = TargetUri::parse("direct:///").unwrap();
        assert!(DirectBuilder.build(&target).is_err());
    }
}
