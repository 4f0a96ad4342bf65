/// ProtocolError represents violations raised while parsing SOCKS or
/// hikari messages
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unsupported SOCKS version: 0x{0:02x}")]
    UnsupportedVersion(u8),

    #[error("unsupported address type: 0x{0:02x}")]
    UnsupportedAddressType(u8),

    #[error("invalid domain name")]
    InvalidDomain,

    #[error("handshake exceeds {0} bytes")]
    HandshakeTooLarge(usize),

    #[error("unsupported hikari version: 0x{0:02x}")]
    UnsupportedHikariVersion(u8),

    #[error("unknown hikari reply: 0x{0:02x}")]
    UnknownReply(u8),
}

/// FrameError represents codec failures. All of them are fatal to the
/// connection
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("checksum verifying fail: expected {expected:08x}, computed {actual:08x}")]
    ChecksumFail { expected: u32, actual: u32 },

    #[error("frame length {0} is shorter than its checksum")]
    BadLength(u16),

    #[error("payload of {0} bytes does not fit in a frame")]
    TooLarge(usize),
}

/// CryptoError represents failures while setting up a cipher
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encrypt type '{0}' not supported")]
    UnsupportedCipher(String),

    #[error("secret can not be empty")]
    EmptySecret,

    #[error("invalid key material for {0}")]
    InvalidKey(&'static str),
}
