//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误类别
///
/// 对应驱动对外承诺的错误分类，由协调器决定是中止启动还是继续运行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 输入校验错误（URI 解析失败、缺少 '/'、未知 scheme）
    InputValidation,
    /// 注册中心客户端构建失败
    BackendConstruction,
    /// 注册中心注册或查询失败
    BackendRegistration,
    /// 名称解析失败
    Resolution,
    /// 调用方取消
    Cancelled,
    /// 配置错误
    Configuration,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InputValidation => "input_validation",
            ErrorCategory::BackendConstruction => "backend_construction",
            ErrorCategory::BackendRegistration => "backend_registration",
            ErrorCategory::Resolution => "resolution",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 错误代码枚举
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: 输入校验错误
/// - 2000-2999: 注册中心后端错误
/// - 3000-3999: 名称解析错误
/// - 9000-9999: 通用错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 输入校验错误 (1000-1999)
    // ============================================================
    BadUrl = 1000,
    InvalidUri = 1001,
    UnknownScheme = 1002,

    // ============================================================
    // 注册中心后端错误 (2000-2999)
    // ============================================================
    BackendUnavailable = 2000,
    RegistrationFailed = 2001,
    DiscoveryFailed = 2002,

    // ============================================================
    // 名称解析错误 (3000-3999)
    // ============================================================
    ResolutionFailed = 3000,

    // ============================================================
    // 通用错误 (9000-9999)
    // ============================================================
    Cancelled = 9000,
    InvalidConfig = 9001,
}

impl ErrorCode {
    /// 数值代码
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 字符串代码（用于日志和序列化）
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadUrl => "BAD_URL",
            ErrorCode::InvalidUri => "INVALID_URI",
            ErrorCode::UnknownScheme => "UNKNOWN_SCHEME",
            ErrorCode::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ErrorCode::RegistrationFailed => "REGISTRATION_FAILED",
            ErrorCode::DiscoveryFailed => "DISCOVERY_FAILED",
            ErrorCode::ResolutionFailed => "RESOLUTION_FAILED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
        }
    }

    /// 错误代码所属类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::BadUrl | ErrorCode::InvalidUri | ErrorCode::UnknownScheme => {
                ErrorCategory::InputValidation
            }
            ErrorCode::BackendUnavailable => ErrorCategory::BackendConstruction,
            ErrorCode::RegistrationFailed | ErrorCode::DiscoveryFailed => {
                ErrorCategory::BackendRegistration
            }
            ErrorCode::ResolutionFailed => ErrorCategory::Resolution,
            ErrorCode::Cancelled => ErrorCategory::Cancelled,
            ErrorCode::InvalidConfig => ErrorCategory::Configuration,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.as_u32())
    }
}
