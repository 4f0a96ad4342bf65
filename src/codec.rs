use crate::error::FrameError;
use bytes::{Buf, BufMut, BytesMut};

// Frame format
// +--------+----------+----------+
// | LENGTH | CHECKSUM | PAYLOAD  |
// +--------+----------+----------+
// |   2    |    4     | Variable |
// +--------+----------+----------+
//
// LENGTH counts CHECKSUM + PAYLOAD. CHECKSUM is the CRC32 of PAYLOAD.
// Both are big-endian.

/// Size of the checksum field
pub const CHECKSUM_SIZE: usize = 4;

/// Bytes added to a payload by framing
pub const FRAME_OVERHEAD: usize = 2 + CHECKSUM_SIZE;

/// Largest payload whose frame length still fits in a u16
pub const MAX_PAYLOAD: usize = u16::MAX as usize - CHECKSUM_SIZE;

/// wrap appends one frame carrying `payload` to `dst`
pub fn wrap(payload: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::TooLarge(payload.len()));
    }

    dst.reserve(FRAME_OVERHEAD + payload.len());
    dst.put_u16((CHECKSUM_SIZE + payload.len()) as u16);
    dst.put_u32(crc32fast::hash(payload));
    dst.put_slice(payload);
    Ok(())
}

/// DecodeState tracks how far the in-flight frame has been read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Idle,
    AwaitingLengthByte2(u8),
    AwaitingBody { length: u16 },
    FrameReady,
}

/// PacketContext reassembles frames from a byte stream that may cut them
/// anywhere
#[derive(Debug)]
pub struct PacketContext {
    state: DecodeState,
    buffer: BytesMut,
}

impl Default for PacketContext {
    fn default() -> Self {
        Self::new()
    }
}

/// PacketContext implementation block
impl PacketContext {
    /// new is a constructor for the PacketContext type
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
            buffer: BytesMut::new(),
        }
    }

    /// is_buffering reports whether part of a frame has been consumed
    pub fn is_buffering(&self) -> bool {
        self.state != DecodeState::Idle
    }

    /// pending_length is the announced length of the frame being read, if
    /// the length prefix has been seen
    pub fn pending_length(&self) -> Option<u16> {
        match self.state {
            DecodeState::AwaitingBody { length } => Some(length),
            _ => None,
        }
    }

    /// unwrap consumes bytes from the front of `src` until one frame is
    /// complete and returns its verified payload. Ok(None) means `src` ran
    /// dry first; the partial frame is kept for the next call
    pub fn unwrap(&mut self, src: &mut &[u8]) -> Result<Option<BytesMut>, FrameError> {
        loop {
            match self.state {
                DecodeState::Idle => {
                    let Some((&high, rest)) = src.split_first() else {
                        return Ok(None);
                    };
                    *src = rest;
                    self.state = DecodeState::AwaitingLengthByte2(high);
                }
                DecodeState::AwaitingLengthByte2(high) => {
                    let Some((&low, rest)) = src.split_first() else {
                        return Ok(None);
                    };
                    *src = rest;

                    let length = u16::from_be_bytes([high, low]);
                    if (length as usize) < CHECKSUM_SIZE {
                        self.reset();
                        return Err(FrameError::BadLength(length));
                    }

                    self.buffer.reserve(length as usize);
                    self.state = DecodeState::AwaitingBody { length };
                }
                DecodeState::AwaitingBody { length } => {
                    let missing = length as usize - self.buffer.len();
                    let take = missing.min(src.len());
                    self.buffer.extend_from_slice(&src[..take]);
                    *src = &src[take..];

                    if self.buffer.len() < length as usize {
                        return Ok(None);
                    }
                    self.state = DecodeState::FrameReady;
                }
                DecodeState::FrameReady => {
                    let mut payload = self.buffer.split();
                    self.state = DecodeState::Idle;

                    let expected = payload.get_u32();
                    let actual = crc32fast::hash(&payload);
                    if expected != actual {
                        return Err(FrameError::ChecksumFail { expected, actual });
                    }

                    return Ok(Some(payload));
                }
            }
        }
    }

    fn reset(&mut self) {
        self.state = DecodeState::Idle;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> BytesMut {
        let mut dst = BytesMut::new();
        wrap(payload, &mut dst).unwrap();
        dst
    }

    #[test]
    fn wrap_layout() {
        let dst = frame(b"hi");
        assert_eq!(&dst[..2], &[0x00, 0x06]);
        assert_eq!(&dst[2..6], &crc32fast::hash(b"hi").to_be_bytes());
        assert_eq!(&dst[6..], b"hi");
    }

    #[test]
    fn wrap_rejects_oversized_payload() {
        let mut dst = BytesMut::new();
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            wrap(&payload, &mut dst),
            Err(FrameError::TooLarge(n)) if n == MAX_PAYLOAD + 1
        ));
        assert!(dst.is_empty());

        let payload = vec![0u8; MAX_PAYLOAD];
        wrap(&payload, &mut dst).unwrap();
        assert_eq!(&dst[..2], &[0xff, 0xff]);
    }

    #[test]
    fn unwrap_byte_by_byte() {
        let bytes = frame(b"hello world");
        let mut ctx = PacketContext::new();

        for (i, byte) in bytes.iter().enumerate() {
            let mut src: &[u8] = std::slice::from_ref(byte);
            let out = ctx.unwrap(&mut src).unwrap();
            assert!(src.is_empty());

            if i + 1 < bytes.len() {
                assert!(out.is_none());
                assert!(ctx.is_buffering());
            } else {
                assert_eq!(&out.unwrap()[..], b"hello world");
                assert!(!ctx.is_buffering());
            }

            if i >= 1 && i + 1 < bytes.len() {
                assert_eq!(ctx.pending_length(), Some(15));
            }
        }
    }

    /// decode_all runs every piece through one context and collects the
    /// payloads in order
    fn decode_all(pieces: &[&[u8]]) -> Vec<BytesMut> {
        let mut ctx = PacketContext::new();
        let mut out = Vec::new();
        for piece in pieces {
            let mut src: &[u8] = piece;
            while let Some(payload) = ctx.unwrap(&mut src).unwrap() {
                out.push(payload);
            }
            assert!(src.is_empty());
        }
        assert!(!ctx.is_buffering());
        out
    }

    #[test]
    fn unwrap_at_every_split_point() {
        let mut bytes = frame(b"first payload");
        bytes.extend_from_slice(&frame(b"second"));

        for split in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(split);
            let out = decode_all(&[head, tail]);
            assert_eq!(out.len(), 2, "split at {}", split);
            assert_eq!(&out[0][..], b"first payload");
            assert_eq!(&out[1][..], b"second");
        }
    }

    #[test]
    fn unwrap_every_payload_length() {
        for len in 0..=4096usize {
            let payload: Vec<u8> = (0..len).map(|i| (i ^ len) as u8).collect();
            let bytes = frame(&payload);
            assert_eq!(bytes.len(), len + FRAME_OVERHEAD);

            let (head, tail) = bytes.split_at(bytes.len() / 2);
            let out = decode_all(&[head, tail]);
            assert_eq!(out.len(), 1, "length {}", len);
            assert_eq!(&out[0][..], &payload[..]);
        }
    }

    #[test]
    fn unwrap_many_frames_in_one_read() {
        let mut bytes = frame(b"one");
        bytes.extend_from_slice(&frame(b""));
        bytes.extend_from_slice(&frame(b"three"));
        // Start of a fourth frame
        bytes.extend_from_slice(&frame(b"four")[..3]);

        let mut ctx = PacketContext::new();
        let mut src: &[u8] = &bytes;
        let mut out = Vec::new();
        while let Some(payload) = ctx.unwrap(&mut src).unwrap() {
            out.push(payload);
        }

        assert_eq!(out.len(), 3);
        assert_eq!(&out[0][..], b"one");
        assert!(out[1].is_empty());
        assert_eq!(&out[2][..], b"three");
        assert_eq!(ctx.pending_length(), Some(8));
    }

    #[test]
    fn unwrap_detects_bit_flip() {
        let mut bytes = frame(b"payload");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let mut ctx = PacketContext::new();
        let mut src: &[u8] = &bytes;
        assert!(matches!(
            ctx.unwrap(&mut src),
            Err(FrameError::ChecksumFail { .. })
        ));
    }

    #[test]
    fn unwrap_rejects_short_length() {
        let mut ctx = PacketContext::new();
        let mut src: &[u8] = &[0x00, 0x03, 0xaa, 0xbb, 0xcc];
        assert!(matches!(
            ctx.unwrap(&mut src),
            Err(FrameError::BadLength(3))
        ));
        assert!(!ctx.is_buffering());
    }
}
