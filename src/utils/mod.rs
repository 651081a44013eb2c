//! 工具函数模块

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::OnceLock;

static LOCAL_IPV4: OnceLock<String> = OnceLock::new();

/// 获取本机对外的 IPv4 地址
///
/// 通过 UDP "连接"（不发送任何报文）让内核选出出口地址，失败时回退到 `127.0.0.1`。
/// 结果在进程内缓存。
pub fn local_ipv4() -> String {
    LOCAL_IPV4.get_or_init(detect_local_ipv4).clone()
}

fn detect_local_ipv4() -> String {
    let detected = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect(("114.114.114.114", 53))?;
            socket.local_addr()
        })
        .ok()
        .map(|addr| addr.ip())
        .filter(|ip| matches!(ip, IpAddr::V4(v4) if !v4.is_unspecified() && !v4.is_loopback()));

    match detected {
        Some(ip) => ip.to_string(),
        None => {
            tracing::warn!("failed to detect local IPv4 address, falling back to 127.0.0.1");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}

/// 拼接 `address:port` 形式的端点
pub fn endpoint(address: &str, port: u16) -> String {
    format!("{}:{}", address, port)
}

/// 将 `address:port` 拆分为地址与端口
///
/// 从右侧切分，兼容未加方括号的 IPv6 地址
pub fn split_endpoint(endpoint: &str) -> Option<(&str, u16)> {
    let (address, port) = endpoint.rsplit_once(':')?;
    if address.is_empty() {
        return None;
    }
    let port = port.parse().ok()?;
    Some((address, port))
}

/// 为不带 scheme 的地址补全 `http://`
pub fn with_http_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", url.trim_end_matches('/'))
    }
}
