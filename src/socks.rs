use crate::address::{self, TargetAddress};
use crate::auth;
use crate::error::ProtocolError;
use crate::protocol::{
    AddressType, Command, RSV, ReplyCode, SOCKS4_REPLY_VERSION, Socks4Reply, Version,
};
use bytes::{Buf, BufMut, BytesMut};

/// SocksState is the progress of a local application through the SOCKS
/// handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksState {
    /// Nothing read yet, the first byte picks the protocol
    New,
    /// SOCKS5 method selection
    AuthMethod,
    /// CONNECT request
    Request,
    /// Request accepted, waiting for the hikari tunnel
    Tunneling,
    /// Relaying application bytes
    Proxy,
}

/// SocksStep tells the caller what to do after feeding bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocksStep {
    /// More bytes are needed
    Pending,
    /// Send these bytes and keep going
    Reply(Vec<u8>),
    /// The application asked for a connection to this target
    Connect(TargetAddress),
    /// Send these bytes and close
    Reject(Vec<u8>),
}

/// SocksHandshake parses SOCKS4 and SOCKS5 handshakes from bytes that
/// arrive in arbitrary pieces
#[derive(Debug)]
pub struct SocksHandshake {
    state: SocksState,
    version: Option<Version>,
    buffer: BytesMut,
    limit: usize,
}

/// SocksHandshake implementation block
impl SocksHandshake {
    /// new is a constructor for the SocksHandshake type. `limit` bounds the
    /// size of an unfinished handshake message
    pub fn new(limit: usize) -> Self {
        Self {
            state: SocksState::New,
            version: None,
            buffer: BytesMut::new(),
            limit,
        }
    }

    pub fn state(&self) -> SocksState {
        self.state
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// feed buffers bytes read from the application
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// advance consumes as much of the buffered input as the current state
    /// allows. A message still incomplete after `limit` bytes is an error
    pub fn advance(&mut self) -> Result<SocksStep, ProtocolError> {
        let step = self.step()?;

        let negotiating = matches!(
            self.state,
            SocksState::New | SocksState::AuthMethod | SocksState::Request
        );
        if step == SocksStep::Pending && negotiating && self.buffer.len() > self.limit {
            return Err(ProtocolError::HandshakeTooLarge(self.limit));
        }

        Ok(step)
    }

    fn step(&mut self) -> Result<SocksStep, ProtocolError> {
        loop {
            match self.state {
                SocksState::New => {
                    let Some(&byte) = self.buffer.first() else {
                        return Ok(SocksStep::Pending);
                    };

                    let version =
                        Version::from_byte(byte).ok_or(ProtocolError::UnsupportedVersion(byte))?;
                    self.version = Some(version);
                    self.state = match version {
                        Version::SOCKS5 => SocksState::AuthMethod,
                        Version::SOCKS4 => SocksState::Request,
                    };
                }
                SocksState::AuthMethod => return Ok(self.parse_method_selection()),
                SocksState::Request => {
                    return match self.version {
                        Some(Version::SOCKS4) => Ok(self.parse_socks4_request()),
                        _ => self.parse_socks5_request(),
                    };
                }
                SocksState::Tunneling | SocksState::Proxy => return Ok(SocksStep::Pending),
            }
        }
    }

    /// take_early_data hands over bytes the application sent after its
    /// request
    pub fn take_early_data(&mut self) -> BytesMut {
        self.buffer.split()
    }

    /// complete marks the tunnel as established
    pub fn complete(&mut self) {
        self.state = SocksState::Proxy;
    }

    fn parse_method_selection(&mut self) -> SocksStep {
        // ClientHello format
        // +----+----------+----------+
        // |VER | NMETHODS | METHODS  |
        // +----+----------+----------+
        // | 1  |    1     | 1 to 255 |
        // +----+----------+----------+

        let Some(&n_methods) = self.buffer.get(1) else {
            return SocksStep::Pending;
        };

        let end = 2 + n_methods as usize;
        let Some(methods) = self.buffer.get(2..end) else {
            return SocksStep::Pending;
        };

        let method = auth::select_auth_method(methods);
        self.buffer.advance(end);
        self.state = SocksState::Request;

        // Server choice
        // +----+--------+
        // |VER | METHOD |
        // +----+--------+
        // | 1  |   1    |
        // +----+--------+
        SocksStep::Reply(vec![Version::SOCKS5 as u8, method as u8])
    }

    fn parse_socks5_request(&mut self) -> Result<SocksStep, ProtocolError> {
        // SOCKS request format
        // +----+-----+-------+------+----------+----------+
        // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+

        if self.buffer.len() < 4 {
            return Ok(SocksStep::Pending);
        }

        let version = self.buffer[0];
        if version != Version::SOCKS5 as u8 {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        if Command::from_byte(self.buffer[1]) != Some(Command::Connect) {
            return Ok(SocksStep::Reject(failure_reply(
                Version::SOCKS5,
                ReplyCode::CommandNotSupported,
            )));
        }

        let Some(atyp) = AddressType::from_byte(self.buffer[3]) else {
            return Ok(SocksStep::Reject(failure_reply(
                Version::SOCKS5,
                ReplyCode::AddrTypeUnsupported,
            )));
        };

        let mut offset = 4;
        let Some(target) = address::parse_socks5_address(&self.buffer, &mut offset, atyp)? else {
            return Ok(SocksStep::Pending);
        };

        self.buffer.advance(offset);
        self.state = SocksState::Tunneling;
        Ok(SocksStep::Connect(target))
    }

    fn parse_socks4_request(&mut self) -> SocksStep {
        // SOCKS4 request format
        // +----+----+---------+-------+----------+------+
        // | VN | CD | DSTPORT | DSTIP |  USERID  | NULL |
        // +----+----+---------+-------+----------+------+
        // | 1  | 1  |    2    |   4   | Variable |  1   |
        // +----+----+---------+-------+----------+------+

        if self.buffer.len() < 2 {
            return SocksStep::Pending;
        }

        if Command::from_byte(self.buffer[1]) != Some(Command::Connect) {
            return SocksStep::Reject(failure_reply(Version::SOCKS4, ReplyCode::CommandNotSupported));
        }

        if self.buffer.len() < 8 {
            return SocksStep::Pending;
        }

        // User id is ignored, only its terminator matters
        let Some(nul) = self.buffer[8..].iter().position(|&b| b == 0) else {
            return SocksStep::Pending;
        };

        let port = u16::from_be_bytes([self.buffer[2], self.buffer[3]]);
        let ip = [self.buffer[4], self.buffer[5], self.buffer[6], self.buffer[7]];

        self.buffer.advance(8 + nul + 1);
        self.state = SocksState::Tunneling;
        SocksStep::Connect(TargetAddress::ipv4(ip, port))
    }
}

/// success_reply builds the reply granting a request, reporting the address
/// the relay bound for it
pub fn success_reply(version: Version, bound: &TargetAddress) -> Vec<u8> {
    match version {
        Version::SOCKS5 => {
            // Server reply format
            // +----+-----+-------+------+----------+----------+
            // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
            // +----+-----+-------+------+----------+----------+
            // | 1  |  1  | X'00' |  1   | Variable |    2     |
            // +----+-----+-------+------+----------+----------+
            let mut reply = BytesMut::with_capacity(22);
            reply.put_u8(Version::SOCKS5 as u8);
            reply.put_u8(ReplyCode::Succeeded as u8);
            reply.put_u8(RSV);
            bound.write_socks5(&mut reply);
            reply.to_vec()
        }
        Version::SOCKS4 => {
            let ip = match bound.socket_addr() {
                Some(std::net::SocketAddr::V4(v4)) => v4.ip().octets(),
                _ => [0; 4],
            };
            socks4_reply(Socks4Reply::Granted, bound.port, ip)
        }
    }
}

/// failure_reply builds a negative reply. SOCKS4 has a single failure code,
/// so `code` only matters for SOCKS5
pub fn failure_reply(version: Version, code: ReplyCode) -> Vec<u8> {
    match version {
        Version::SOCKS5 => vec![
            Version::SOCKS5 as u8,
            code as u8,
            RSV,
            AddressType::IPv4 as u8,
            0,
            0,
            0,
            0,
            0,
            0,
        ],
        Version::SOCKS4 => socks4_reply(Socks4Reply::RejectedOrFailed, 0, [0; 4]),
    }
}

fn socks4_reply(code: Socks4Reply, port: u16, ip: [u8; 4]) -> Vec<u8> {
    // SOCKS4 reply format
    // +----+----+---------+-------+
    // | VN | CD | DSTPORT | DSTIP |
    // +----+----+---------+-------+
    // | 1  | 1  |    2    |   4   |
    // +----+----+---------+-------+
    let mut reply = Vec::with_capacity(8);
    reply.push(SOCKS4_REPLY_VERSION);
    reply.push(code as u8);
    reply.extend_from_slice(&port.to_be_bytes());
    reply.extend_from_slice(&ip);
    reply
}
