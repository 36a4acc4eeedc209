//! 本机网络探测
//!
//! 注册到远端注册中心的 endpoint 里若带有 `localhost`，对其它主机上的调用方毫无意义，
//! 这里负责找出一个可路由的本机 IPv4 地址，并在注册前替换掉 `localhost`。

use std::net::{IpAddr, Ipv4Addr};
use std::sync::LazyLock;

/// endpoint 中需要被替换的主机名
pub const LOCALHOST: &str = "localhost";

/// 进程启动时采集一次的主机名，采集失败时为空字符串
static HOSTNAME: LazyLock<String> = LazyLock::new(|| {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_default()
});

/// 本机主机名（只读快照）
pub fn hostname() -> &'static str {
    HOSTNAME.as_str()
}

/// 返回第一个非回环、可表示为 IPv4 的网卡地址
///
/// 枚举网卡失败或没有符合条件的地址时返回空字符串。
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .filter(|iface| !iface.is_loopback())
                .find_map(|iface| routable_v4(iface.ip()))
        })
        .map(|ip| ip.to_string())
        .unwrap_or_default()
}

/// 地址的 IPv4 形式，回环地址（包括 `::ffff:127.0.0.1`）返回 `None`
fn routable_v4(ip: IpAddr) -> Option<Ipv4Addr> {
    let v4 = match ip {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => v6.to_ipv4_mapped()?,
    };
    (!v4.is_loopback()).then_some(v4)
}

/// 主机探测
///
/// 注册流程只通过这个 trait 读取主机信息，测试可以注入固定值。
pub trait HostProbe: Send + Sync {
    /// 非回环 IPv4 地址，没有时为空字符串
    fn local_ip(&self) -> String;

    /// 主机名，没有时为空字符串
    fn hostname(&self) -> String;
}

/// 读取真实网卡和主机名的探测器
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn local_ip(&self) -> String {
        local_ip()
    }

    fn hostname(&self) -> String {
        hostname().to_string()
    }
}

/// 将 endpoint 列表中所有 `localhost` 替换为本机 IP
///
/// 只有 endpoint 中出现 `localhost` 时才会探测本机 IP；探测不到地址时原样返回。
/// 替换是纯文本替换，不区分 host 部分和其它部分。
pub fn rewrite_localhost(endpoint: &str, probe: &dyn HostProbe) -> String {
    if !endpoint.contains(LOCALHOST) {
        return endpoint.to_string();
    }
    let ip = probe.local_ip();
    if ip.is_empty() {
        return endpoint.to_string();
    }
    endpoint.replace(LOCALHOST, &ip)
}
