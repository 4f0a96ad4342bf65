use crate::error::ProtocolError;
use crate::protocol::{AddressType, HikariAddressType};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// AddressKind is the kind of destination named by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    IPv4,
    IPv6,
    Domain,
}

/// TargetAddress is a destination captured from a SOCKS or hikari request.
/// `bytes` holds 4 octets, 16 octets or the raw domain name depending on `kind`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    pub kind: AddressKind,
    pub bytes: Vec<u8>,
    pub port: u16,
}

/// TargetAddress implementation block
impl TargetAddress {
    /// ipv4 builds an IPv4 target
    pub fn ipv4(octets: [u8; 4], port: u16) -> Self {
        Self {
            kind: AddressKind::IPv4,
            bytes: octets.to_vec(),
            port,
        }
    }

    /// ipv6 builds an IPv6 target
    pub fn ipv6(octets: [u8; 16], port: u16) -> Self {
        Self {
            kind: AddressKind::IPv6,
            bytes: octets.to_vec(),
            port,
        }
    }

    /// domain builds a domain target, rejecting names that cannot be
    /// carried behind a one byte length prefix
    pub fn domain(name: &str, port: u16) -> Result<Self, ProtocolError> {
        if name.is_empty() || name.len() > u8::MAX as usize {
            return Err(ProtocolError::InvalidDomain);
        }

        Ok(Self {
            kind: AddressKind::Domain,
            bytes: name.as_bytes().to_vec(),
            port,
        })
    }

    pub fn is_domain(&self) -> bool {
        self.kind == AddressKind::Domain
    }

    /// socket_addr returns the address for IP targets, None for domains
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self.kind {
            AddressKind::IPv4 => <[u8; 4]>::try_from(self.bytes.as_slice())
                .ok()
                .map(|octets| SocketAddr::from((Ipv4Addr::from(octets), self.port))),
            AddressKind::IPv6 => <[u8; 16]>::try_from(self.bytes.as_slice())
                .ok()
                .map(|octets| SocketAddr::from((Ipv6Addr::from(octets), self.port))),
            AddressKind::Domain => None,
        }
    }

    /// host renders the address part without the port
    pub fn host(&self) -> String {
        match self.socket_addr() {
            Some(addr) => addr.ip().to_string(),
            None => String::from_utf8_lossy(&self.bytes).into_owned(),
        }
    }

    /// resolve turns the target into a connectable socket address, looking
    /// domains up through the system resolver
    pub async fn resolve(&self) -> io::Result<SocketAddr> {
        if let Some(addr) = self.socket_addr() {
            return Ok(addr);
        }

        let host = self.host();
        tokio::net::lookup_host((host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no address found for {host}"))
            })
    }

    /// write_socks5 appends `ATYP | ADDR | PORT` using SOCKS5 address types
    pub fn write_socks5(&self, dst: &mut BytesMut) {
        let atyp = match self.kind {
            AddressKind::IPv4 => AddressType::IPv4,
            AddressKind::IPv6 => AddressType::IPv6,
            AddressKind::Domain => AddressType::DomainName,
        };
        dst.put_u8(atyp as u8);
        self.write_body(dst);
    }

    /// write_hikari appends `ATYP | ADDR | PORT` using hikari address types
    pub fn write_hikari(&self, dst: &mut BytesMut) {
        let atyp = match self.kind {
            AddressKind::IPv4 => HikariAddressType::IPv4,
            AddressKind::IPv6 => HikariAddressType::IPv6,
            AddressKind::Domain => HikariAddressType::Domain,
        };
        dst.put_u8(atyp as u8);
        self.write_body(dst);
    }

    fn write_body(&self, dst: &mut BytesMut) {
        if self.kind == AddressKind::Domain {
            // Length fits: enforced by the constructors and parsers
            dst.put_u8(self.bytes.len() as u8);
        }
        dst.put_slice(&self.bytes);
        dst.put_u16(self.port);
    }
}

impl From<SocketAddr> for TargetAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => TargetAddress::ipv4(v4.ip().octets(), v4.port()),
            SocketAddr::V6(v6) => TargetAddress::ipv6(v6.ip().octets(), v6.port()),
        }
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.socket_addr() {
            Some(addr) => write!(f, "{addr}"),
            None => write!(f, "{}:{}", self.host(), self.port),
        }
    }
}

// The parsers below read from `data` starting at `offset`. They return
// Ok(None) while the message is still incomplete and only move `offset`
// once a whole address and port have been consumed.

/// parse_socks5_address parses `DST.ADDR | DST.PORT` for a SOCKS5 ATYP
pub fn parse_socks5_address(
    data: &[u8],
    offset: &mut usize,
    atyp: AddressType,
) -> Result<Option<TargetAddress>, ProtocolError> {
    match atyp {
        AddressType::IPv4 => Ok(parse_ipv4_address(data, offset)),
        AddressType::IPv6 => Ok(parse_ipv6_address(data, offset)),
        AddressType::DomainName => parse_domain_address(data, offset),
    }
}

/// parse_hikari_address parses `ADDR | PORT` for a hikari address type
pub fn parse_hikari_address(
    data: &[u8],
    offset: &mut usize,
    atyp: HikariAddressType,
) -> Result<Option<TargetAddress>, ProtocolError> {
    match atyp {
        HikariAddressType::IPv4 => Ok(parse_ipv4_address(data, offset)),
        HikariAddressType::IPv6 => Ok(parse_ipv6_address(data, offset)),
        HikariAddressType::Domain => parse_domain_address(data, offset),
    }
}

/// parse_ipv4_address parses an IPv4 address and port from a byte slice
pub fn parse_ipv4_address(data: &[u8], offset: &mut usize) -> Option<TargetAddress> {
    // 4 address bytes + 2 port bytes
    let end = *offset + 6;
    let field = data.get(*offset..end)?;

    let octets = [field[0], field[1], field[2], field[3]];
    let port = u16::from_be_bytes([field[4], field[5]]);

    *offset = end;
    Some(TargetAddress::ipv4(octets, port))
}

/// parse_ipv6_address parses an IPv6 address and port from a byte slice
pub fn parse_ipv6_address(data: &[u8], offset: &mut usize) -> Option<TargetAddress> {
    // 16 address bytes + 2 port bytes
    let end = *offset + 18;
    let field = data.get(*offset..end)?;

    let mut octets = [0u8; 16];
    octets.copy_from_slice(&field[..16]);
    let port = u16::from_be_bytes([field[16], field[17]]);

    *offset = end;
    Some(TargetAddress::ipv6(octets, port))
}

/// parse_domain_address parses a length-prefixed domain and port from a byte slice
pub fn parse_domain_address(
    data: &[u8],
    offset: &mut usize,
) -> Result<Option<TargetAddress>, ProtocolError> {
    // First octet contains the number of octets to follow
    let Some(&domain_len) = data.get(*offset) else {
        return Ok(None);
    };

    if domain_len == 0 {
        return Err(ProtocolError::InvalidDomain);
    }

    let start = *offset + 1;
    let end = start + domain_len as usize + 2;
    let Some(field) = data.get(start..end) else {
        return Ok(None);
    };

    let (name, port) = field.split_at(domain_len as usize);
    let name = std::str::from_utf8(name).map_err(|_| ProtocolError::InvalidDomain)?;
    let port = u16::from_be_bytes([port[0], port[1]]);

    let target = TargetAddress::domain(name, port)?;
    *offset = end;
    Ok(Some(target))
}
