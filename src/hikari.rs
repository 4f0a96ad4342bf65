use crate::address::{self, TargetAddress};
use crate::auth::{AuthorizedKeys, KeyHash};
use crate::error::ProtocolError;
use crate::protocol::{HIKARI_VERSION, HikariAddressType, HikariReply, KEY_HASH_LEN, ReplyCode};
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;

// Auth request format
// +-----+----------+------+----------+------+
// | VER | KEY HASH | ATYP |   ADDR   | PORT |
// +-----+----------+------+----------+------+
// |  1  |    16    |  1   | Variable |  2   |
// +-----+----------+------+----------+------+
//
// ADDR is 4 octets (IPv4), 16 octets (IPv6) or a length octet followed by
// the domain name.

const REQUEST_HEADER_LEN: usize = 1 + KEY_HASH_LEN + 1;

/// encode_auth_request builds the first message a client sends
pub fn encode_auth_request(key: &KeyHash, target: &TargetAddress) -> BytesMut {
    let mut request = BytesMut::with_capacity(REQUEST_HEADER_LEN + target.bytes.len() + 3);
    request.put_u8(HIKARI_VERSION);
    request.put_slice(key);
    target.write_hikari(&mut request);
    request
}

/// RequestError is a request the server refuses
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("hikari version 0x{0:02x} not supported")]
    Version(u8),

    #[error("unknown private key")]
    Auth,

    #[error(transparent)]
    Malformed(#[from] ProtocolError),
}

/// RequestError implementation block
impl RequestError {
    /// reply is the answer owed to the client, None when the connection is
    /// dropped without one
    pub fn reply(&self) -> Option<HikariReply> {
        match self {
            RequestError::Version(_) => Some(HikariReply::VersionNotSupport),
            RequestError::Auth => Some(HikariReply::AuthFail),
            RequestError::Malformed(_) => None,
        }
    }
}

/// parse_auth_request validates a request as far as the buffered bytes
/// allow. On success it returns the target and the number of bytes the
/// request occupied; Ok(None) means more bytes are needed
pub fn parse_auth_request(
    buf: &[u8],
    keys: &AuthorizedKeys,
) -> Result<Option<(TargetAddress, usize)>, RequestError> {
    let Some(&version) = buf.first() else {
        return Ok(None);
    };
    if version != HIKARI_VERSION {
        return Err(RequestError::Version(version));
    }

    let Some(hash) = buf.get(1..1 + KEY_HASH_LEN) else {
        return Ok(None);
    };
    if !keys.contains(hash) {
        return Err(RequestError::Auth);
    }

    let Some(&atyp) = buf.get(REQUEST_HEADER_LEN - 1) else {
        return Ok(None);
    };
    let atyp = HikariAddressType::from_byte(atyp)
        .ok_or(ProtocolError::UnsupportedAddressType(atyp))?;

    let mut offset = REQUEST_HEADER_LEN;
    Ok(address::parse_hikari_address(buf, &mut offset, atyp)?.map(|target| (target, offset)))
}

// Auth response format
// +-----+-----+------+----------+----------+
// | VER | REP | ATYP | BND.ADDR | BND.PORT |
// +-----+-----+------+----------+----------+
// |  1  |  1  |  1   | Variable |    2     |
// +-----+-----+------+----------+----------+
//
// ATYP, BND.ADDR and BND.PORT are only present when REP is OK.

/// encode_auth_ok builds the response accepting a request
pub fn encode_auth_ok(bound: SocketAddr) -> BytesMut {
    let mut response = BytesMut::with_capacity(21);
    response.put_u8(HIKARI_VERSION);
    response.put_u8(HikariReply::Ok as u8);
    TargetAddress::from(bound).write_hikari(&mut response);
    response
}

/// encode_auth_fail builds a refusal
pub fn encode_auth_fail(reply: HikariReply) -> BytesMut {
    let mut response = BytesMut::with_capacity(2);
    response.put_u8(HIKARI_VERSION);
    response.put_u8(reply as u8);
    response
}

/// AuthResponse is the server's verdict on an auth request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResponse {
    /// Accepted, carrying the address the server bound towards the target
    Ok(TargetAddress),
    Fail(HikariReply),
}

/// parse_auth_response decodes the server's answer. On success it returns
/// the verdict and the number of bytes it occupied
pub fn parse_auth_response(buf: &[u8]) -> Result<Option<(AuthResponse, usize)>, ProtocolError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    if buf[0] != HIKARI_VERSION {
        return Err(ProtocolError::UnsupportedHikariVersion(buf[0]));
    }

    let reply = HikariReply::from_byte(buf[1]).ok_or(ProtocolError::UnknownReply(buf[1]))?;
    if reply != HikariReply::Ok {
        return Ok(Some((AuthResponse::Fail(reply), 2)));
    }

    let Some(&atyp) = buf.get(2) else {
        return Ok(None);
    };
    let atyp =
        HikariAddressType::from_byte(atyp).ok_or(ProtocolError::UnsupportedAddressType(atyp))?;

    let mut offset = 3;
    let bound = address::parse_hikari_address(buf, &mut offset, atyp)?;
    Ok(bound.map(|bound| (AuthResponse::Ok(bound), offset)))
}

/// socks5_reply_for translates a hikari refusal into the SOCKS5 reply sent
/// to the local application
pub fn socks5_reply_for(reply: HikariReply) -> ReplyCode {
    match reply {
        HikariReply::DnsResolveFail => ReplyCode::HostUnreachable,
        HikariReply::ConnectTargetFail => ReplyCode::NetworkUnreachable,
        HikariReply::Ok | HikariReply::VersionNotSupport | HikariReply::AuthFail => {
            ReplyCode::GeneralFailure
        }
    }
}
