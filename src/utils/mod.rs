//! 工具函数模块

pub mod net;

pub use net::{HostProbe, LOCALHOST, SystemProbe, hostname, local_ip, rewrite_localhost};
