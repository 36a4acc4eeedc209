//! 驱动统一错误类型
//!
//! 错误只返回、不吞掉；后端错误原样透传给调用方。

use super::code::{ErrorCategory, ErrorCode};
use thiserror::Error;

/// 驱动结果类型
pub type Result<T> = std::result::Result<T, DriverError>;

/// 注册中心后端错误
#[derive(Error, Debug)]
pub enum BackendError {
    /// etcd 客户端错误
    #[error(transparent)]
    Etcd(#[from] etcd_client::Error),

    /// Consul HTTP 请求错误
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// etcd lease 已过期或被撤销
    #[error("etcd lease {0} expired")]
    LeaseExpired(i64),

    /// Consul agent 返回非 2xx 状态
    #[error("consul agent responded {status}: {body}")]
    Consul { status: u16, body: String },

    /// 服务实例编解码错误
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// gRPC 传输层错误
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
}

/// 驱动错误
#[derive(Error, Debug)]
pub enum DriverError {
    /// 裸地址中没有 '/'
    #[error("bad url: '{0}'. no '/' found")]
    BadUrl(String),

    /// URI 无法解析
    #[error("parse {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// 不支持的注册中心 scheme
    #[error("unknown scheme: {0}")]
    UnknownScheme(String),

    /// 构建后端客户端失败
    #[error(transparent)]
    Connect(BackendError),

    /// 向后端注册失败
    #[error(transparent)]
    Register(BackendError),

    /// 从后端查询实例失败
    #[error(transparent)]
    Discover(BackendError),

    /// 名称解析失败
    #[error("resolver: {0}")]
    Resolver(String),

    /// 调用方取消了注册
    #[error("registration cancelled")]
    Cancelled,

    /// 配置错误
    #[error("config: {0}")]
    Config(String),
}

impl DriverError {
    /// 创建 URI 解析错误
    pub fn invalid_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::InvalidUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// 创建名称解析错误
    pub fn resolver(msg: impl Into<String>) -> Self {
        DriverError::Resolver(msg.into())
    }

    /// 错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            DriverError::BadUrl(_) => ErrorCode::BadUrl,
            DriverError::InvalidUri { .. } => ErrorCode::InvalidUri,
            DriverError::UnknownScheme(_) => ErrorCode::UnknownScheme,
            DriverError::Connect(_) => ErrorCode::BackendUnavailable,
            DriverError::Register(_) => ErrorCode::RegistrationFailed,
            DriverError::Discover(_) => ErrorCode::DiscoveryFailed,
            DriverError::Resolver(_) => ErrorCode::ResolutionFailed,
            DriverError::Cancelled => ErrorCode::Cancelled,
            DriverError::Config(_) => ErrorCode::InvalidConfig,
        }
    }

    /// 错误类别
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_validation_messages() {
        assert_eq!(
            DriverError::BadUrl("no-slash".to_string()).to_string(),
            "bad url: 'no-slash'. no '/' found"
        );
        assert_eq!(
            DriverError::UnknownScheme("redis".to_string()).to_string(),
            "unknown scheme: redis"
        );
        assert_eq!(
            DriverError::invalid_uri(":x", "missing protocol scheme").to_string(),
            "parse \":x\": missing protocol scheme"
        );
    }

    #[test]
    fn test_backend_errors_are_verbatim() {
        let backend = BackendError::Consul {
            status: 500,
            body: "rpc error".to_string(),
        };
        let expected = backend.to_string();
        assert_eq!(DriverError::Register(backend).to_string(), expected);
    }

    #[test]
    fn test_stage_decides_backend_category() {
        let cause = || BackendError::Etcd(etcd_client::Error::InvalidArgs("no endpoint".to_string()));

        assert_eq!(
            DriverError::Connect(cause()).category(),
            ErrorCategory::BackendConstruction
        );
        assert_eq!(
            DriverError::Register(cause()).category(),
            ErrorCategory::BackendRegistration
        );
        assert_eq!(DriverError::Discover(cause()).code(), ErrorCode::DiscoveryFailed);
        assert_eq!(
            DriverError::Register(BackendError::LeaseExpired(7)).to_string(),
            "etcd lease 7 expired"
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            DriverError::BadUrl(String::new()).category(),
            ErrorCategory::InputValidation
        );
        assert_eq!(
            DriverError::Connect(BackendError::Consul {
                status: 503,
                body: String::new()
            })
            .category(),
            ErrorCategory::BackendConstruction
        );
        assert_eq!(DriverError::Cancelled.category(), ErrorCategory::Cancelled);
    }
}
