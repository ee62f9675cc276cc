//! Connection strings as ground-station users type them, mapped onto the
//! address syntax `mavlink::connect` understands.

use anyhow::Result;

use crate::error::FcError;

pub const DEFAULT_SERIAL_BAUD: u32 = 115200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MavAddress {
    UdpIn { host: String, port: u16 },
    UdpOut { host: String, port: u16 },
    UdpBcast { host: String, port: u16 },
    TcpOut { host: String, port: u16 },
    TcpIn { host: String, port: u16 },
    Serial { dev: String, baud: u32 },
}

impl MavAddress {
    pub fn to_url(&self) -> String {
        match self {
            MavAddress::UdpIn { host, port } => format!("udpin:{}:{}", host, port),
            MavAddress::UdpOut { host, port } => format!("udpout:{}:{}", host, port),
            MavAddress::UdpBcast { host, port } => format!("udpbcast:{}:{}", host, port),
            MavAddress::TcpOut { host, port } => format!("tcpout:{}:{}", host, port),
            MavAddress::TcpIn { host, port } => format!("tcpin:{}:{}", host, port),
            MavAddress::Serial { dev, baud } => format!("serial:{}:{}", dev, baud),
        }
    }

    pub fn is_serial(&self) -> bool {
        matches!(self, MavAddress::Serial { .. })
    }
}

/// Accepts `host:port` (UDP listen), `udp:`/`tcp:` shorthands, the native
/// `udpin:`/`udpout:`/`udpbcast:`/`tcpin:`/`tcpout:`/`serial:` forms, and bare
/// serial devices with an optional `,baud` suffix.
pub fn parse(conn: &str) -> Result<MavAddress> {
    let s = conn.trim();
    if s.is_empty() {
        return Err(FcError::BadConnectionString(conn.into(), "empty").into());
    }

    if let Some((scheme, rest)) = s.split_once(':') {
        let net = |rest: &str| host_port(conn, rest);
        match scheme {
            "udp" | "udpin" => {
                let (host, port) = net(rest)?;
                return Ok(MavAddress::UdpIn { host, port });
            }
            "udpout" => {
                let (host, port) = net(rest)?;
                return Ok(MavAddress::UdpOut { host, port });
            }
            "udpbcast" => {
                let (host, port) = net(rest)?;
                return Ok(MavAddress::UdpBcast { host, port });
            }
            "tcp" | "tcpout" => {
                let (host, port) = net(rest)?;
                return Ok(MavAddress::TcpOut { host, port });
            }
            "tcpin" => {
                let (host, port) = net(rest)?;
                return Ok(MavAddress::TcpIn { host, port });
            }
            "serial" => {
                let (dev, baud) = rest.rsplit_once(':')
                    .ok_or_else(|| FcError::BadConnectionString(conn.into(), "serial needs dev:baud"))?;
                return Ok(MavAddress::Serial { dev: dev.into(), baud: baud_of(conn, baud)? });
            }
            _ => {}
        }
    }

    if is_serial_device(s) {
        let (dev, baud) = match s.split_once(',') {
            Some((dev, baud)) => (dev, baud_of(conn, baud)?),
            None => (s, DEFAULT_SERIAL_BAUD),
        };
        return Ok(MavAddress::Serial { dev: dev.into(), baud });
    }

    let (host, port) = host_port(conn, s)?;
    Ok(MavAddress::UdpIn { host, port })
}

fn is_serial_device(s: &str) -> bool {
    if s.starts_with("/dev/") {
        return true;
    }
    let dev = s.split(',').next().unwrap_or(s);
    match (dev.get(..3), dev.get(3..)) {
        (Some(prefix), Some(num)) => {
            prefix.eq_ignore_ascii_case("COM")
                && !num.is_empty()
                && num.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn host_port(conn: &str, s: &str) -> Result<(String, u16)> {
    let (host, port) = s.rsplit_once(':')
        .ok_or_else(|| FcError::BadConnectionString(conn.into(), "missing port"))?;
    if host.is_empty() {
        return Err(FcError::BadConnectionString(conn.into(), "missing host").into());
    }
    let port: u16 = port.parse()
        .map_err(|_| FcError::BadConnectionString(conn.into(), "invalid port"))?;
    Ok((host.into(), port))
}

fn baud_of(conn: &str, s: &str) -> Result<u32> {
    match s.trim().parse::<u32>() {
        Ok(b) if b > 0 => Ok(b),
        _ => Err(FcError::BadConnectionString(conn.into(), "invalid baud").into()),
    }
}
