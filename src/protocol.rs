// RSV: Fields marked RESERVED (RSV) must be set to X'00'.
pub const RSV: u8 = 0x00;

/// Version represents the SOCKS versions accepted from local applications
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    SOCKS4 = 0x04,
    SOCKS5 = 0x05,
}

/// Version implementation block
impl Version {
    /// from_byte converts the leading byte of a handshake to a SOCKS version
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x04 => Some(Version::SOCKS4),
            0x05 => Some(Version::SOCKS5),
            _ => None,
        }
    }
}

/// AddressType represents the SOCKS5 address types:
/// IPv4, Domain Name, IPv6
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    IPv4 = 0x01,
    DomainName = 0x03,
    IPv6 = 0x04,
}

/// AddressType implementation block
impl AddressType {
    /// from_byte converts a byte to its related network address type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(AddressType::IPv4),
            0x03 => Some(AddressType::DomainName),
            0x04 => Some(AddressType::IPv6),
            _ => None,
        }
    }
}

/// AuthMethod represents available SOCKS5
/// authentication methods
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    NoAuth = 0x00,
    // Gssapi = 0x01, not implemented
    // UserPass = 0x02, not implemented
    // 0x03 - 0x7f: IANA reserved
    // 0x80 - 0xFE: private methods
    // 0xFF: no acceptable methods, never sent since NoAuth is always chosen
}

/// Command represents SOCKS protocol commands. SOCKS4 shares
/// the values of CONNECT and BIND
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

/// Command implementation block
impl Command {
    /// from_byte converts a byte to its related SOCKS protocol command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Command::Connect),
            0x02 => Some(Command::Bind),
            0x03 => Some(Command::UdpAssociate),
            _ => None,
        }
    }
}

/// ReplyCode represents the SOCKS5 REP field (RFC 1928)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddrTypeUnsupported = 0x08,
    // 0x09 - 0xFF: unassigned
}

/// VN field of every SOCKS4 reply
pub const SOCKS4_REPLY_VERSION: u8 = 0x00;

/// Socks4Reply represents the SOCKS4 CD field of a reply
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4Reply {
    Granted = 0x5A,
    RejectedOrFailed = 0x5B,
}

/// Hikari protocol version spoken on the encrypted leg
pub const HIKARI_VERSION: u8 = 0x01;

/// Length of the MD5 key hash carried by an auth request
pub const KEY_HASH_LEN: usize = 16;

/// HikariAddressType represents the address kinds of the hikari protocol.
/// Note these differ from the SOCKS5 values
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HikariAddressType {
    IPv4 = 0x00,
    IPv6 = 0x01,
    Domain = 0x02,
}

/// HikariAddressType implementation block
impl HikariAddressType {
    /// from_byte converts a byte to its related hikari address type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(HikariAddressType::IPv4),
            0x01 => Some(HikariAddressType::IPv6),
            0x02 => Some(HikariAddressType::Domain),
            _ => None,
        }
    }
}

/// HikariReply represents the reply field of a hikari auth response
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HikariReply {
    Ok = 0x00,
    VersionNotSupport = 0x01,
    AuthFail = 0x02,
    // 0x03: unassigned
    DnsResolveFail = 0x04,
    ConnectTargetFail = 0x05,
}

/// HikariReply implementation block
impl HikariReply {
    /// from_byte converts a byte to its related hikari reply
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(HikariReply::Ok),
            0x01 => Some(HikariReply::VersionNotSupport),
            0x02 => Some(HikariReply::AuthFail),
            0x04 => Some(HikariReply::DnsResolveFail),
            0x05 => Some(HikariReply::ConnectTargetFail),
            _ => None,
        }
    }
}
