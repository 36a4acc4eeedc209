//! 错误处理模块
//!
//! 提供驱动统一的错误类型、错误代码和错误类别

pub mod code;
pub mod driver_error;

// 重新导出公共类型
pub use code::{ErrorCategory, ErrorCode};
pub use driver_error::{BackendError, DriverError, Result};
