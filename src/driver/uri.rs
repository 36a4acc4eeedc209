//! 注册目标与调用地址解析
//!
//! 注册目标形如 `etcd://10.0.0.1:2379,10.0.0.2:2379/svc.order`，authority 部分是逗号分隔的
//! 主机列表，遵循 URL 标准的解析器会拒绝这种写法，因此这里按通用
//! `scheme://authority/path` 语法自行拆分。

use std::fmt;
use std::str::FromStr;

use crate::error::{DriverError, Result};

/// 解析后的 `scheme://host/path`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetUri {
    /// 小写 scheme，没有 scheme 时为空
    pub scheme: String,
    /// authority 中去掉 userinfo 后的部分，可能是逗号分隔的主机列表
    pub host: String,
    /// 以 '/' 开头、已解码 `%XX` 的路径（或为空）
    pub path: String,
}

impl TargetUri {
    /// 解析 URI
    ///
    /// - 拒绝控制字符
    /// - scheme 以字母开头，只能包含字母、数字和 `+-.`，以 ':' 开头视为缺少 scheme
    /// - `?` 和 `#` 之后的内容被丢弃
    /// - 有 `//` 时读取 authority，最后一个 ':' 之后的端口必须是数字
    /// - 路径中的 `%XX` 被解码，不完整的转义视为错误
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.bytes().any(|b| b < 0x20 || b == 0x7f) {
            return Err(DriverError::invalid_uri(raw, "invalid control character in URL"));
        }

        let without_fragment = raw.split_once('#').map_or(raw, |(head, _)| head);
        let (scheme, rest) = split_scheme(raw, without_fragment)?;
        let rest = rest.split_once('?').map_or(rest, |(head, _)| head);

        let Some(after_slashes) = rest.strip_prefix("//") else {
            // 没有 authority：`scheme:/path` 保留路径，`scheme:opaque` 没有路径
            let path = if scheme.is_empty() || rest.starts_with('/') {
                unescape_path(raw, rest)?
            } else {
                String::new()
            };
            return Ok(Self {
                scheme,
                host: String::new(),
                path,
            });
        };

        let (authority, path) = match after_slashes.find('/') {
            Some(idx) => after_slashes.split_at(idx),
            None => (after_slashes, ""),
        };
        let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        validate_host(raw, host)?;

        Ok(Self {
            scheme,
            host: host.to_string(),
            path: unescape_path(raw, path)?,
        })
    }

    /// 去掉前导 '/' 的路径，即服务名
    pub fn service_name(&self) -> &str {
        self.path.strip_prefix('/').unwrap_or(&self.path)
    }

    /// 逗号分隔的主机列表
    pub fn hosts(&self) -> Vec<String> {
        self.host.split(',').map(str::to_string).collect()
    }
}

impl FromStr for TargetUri {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}://{}{}", self.scheme, self.host, self.path)
        }
    }
}

fn split_scheme<'a>(raw: &str, s: &'a str) -> Result<(String, &'a str)> {
    for (i, c) in s.char_indices() {
        match c {
            'a'..='z' | 'A'..='Z' => {}
            '0'..='9' | '+' | '-' | '.' if i > 0 => {}
            ':' if i == 0 => return Err(DriverError::invalid_uri(raw, "missing protocol scheme")),
            ':' => return Ok((s[..i].to_ascii_lowercase(), &s[i + 1..])),
            _ => break,
        }
    }
    Ok((String::new(), s))
}

fn validate_host(raw: &str, host: &str) -> Result<()> {
    if let Some(bad) = host.chars().find(|c| !is_host_char(*c)) {
        return Err(DriverError::invalid_uri(
            raw,
            format!("invalid character {:?} in host name", bad),
        ));
    }
    // 方括号内的 IPv6 地址不参与端口检查
    let tail = host.rsplit_once(']').map_or(host, |(_, tail)| tail);
    if let Some((_, port)) = tail.rsplit_once(':') {
        if !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DriverError::invalid_uri(
                raw,
                format!("invalid port {:?} after host", format!(":{}", port)),
            ));
        }
    }
    Ok(())
}

fn unescape_path(raw: &str, path: &str) -> Result<String> {
    if !path.contains('%') {
        return Ok(path.to_string());
    }

    let bytes = path.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            decoded.push(bytes[i]);
            i += 1;
            continue;
        }
        let byte = bytes
            .get(i + 1..i + 3)
            .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        let Some(byte) = byte else {
            let escape: String = path[i..].chars().take(3).collect();
            return Err(DriverError::invalid_uri(
                raw,
                format!("invalid URL escape {:?}", escape),
            ));
        };
        decoded.push(byte);
        i += 3;
    }
    String::from_utf8(decoded).map_err(|_| DriverError::invalid_uri(raw, "invalid UTF-8 in path"))
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~!$&'()*+,;=:[]%".contains(c)
}

/// 将调用地址拆分为 `(server, method)`
///
/// - 不含 `//` 的裸地址在第一个 '/' 处拆分，method 保留前导 '/'：
///   `127.0.0.1:8080/svc.Method` → `("127.0.0.1:8080", "/svc.Method")`
/// - 完整地址保留路径的第一段作为服务名：
///   `discovery:///svc.order/Create` → `("discovery:///svc.order", "/Create")`
/// - 路径只有一段时 method 为空，server 包含整个路径
///
/// 完整地址解析失败时返回 [`DriverError::InvalidUri`]。
pub fn parse_server_method(uri: &str) -> Result<(String, String)> {
    if !uri.contains("//") {
        let sep = uri
            .find('/')
            .ok_or_else(|| DriverError::BadUrl(uri.to_string()))?;
        return Ok((uri[..sep].to_string(), uri[sep..].to_string()));
    }

    let target = TargetUri::parse(uri)?;
    let path = target.path.as_str();
    let split = path
        .get(1..)
        .and_then(|rest| rest.find('/'))
        .map_or(path.len(), |idx| idx + 1);
    let server = format!("{}://{}{}", target.scheme, target.host, &path[..split]);
    Ok((server, path[split..].to_string()))
}
