use crate::address::TargetAddress;
use crate::codec::{self, FRAME_OVERHEAD, PacketContext};
use crate::crypto::CipherSession;
use crate::error::FrameError;
use crate::socks::SocksHandshake;
use bytes::{Buf, BytesMut};
use std::cell::OnceCell;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tracing::debug;

/// Side names one of the two slots of a Pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The accepted connection
    Ingress,
    /// The connection opened on its behalf
    Egress,
}

/// Side implementation block
impl Side {
    /// peer returns the opposite slot
    pub fn peer(self) -> Self {
        match self {
            Side::Ingress => Side::Egress,
            Side::Egress => Side::Ingress,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::Ingress => 0,
            Side::Egress => 1,
        }
    }
}

/// HikariState is the progress of a hikari leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HikariState {
    /// Waiting for the auth request (server) or response (client)
    Auth,
    /// Relaying application bytes
    Proxy,
}

/// Tunnel holds everything an encrypted leg needs: its handshake state, the
/// frame reassembly state, the cipher stream and the decrypted bytes of a
/// handshake message still being collected
#[derive(Debug)]
pub struct Tunnel {
    pub state: HikariState,
    packet: PacketContext,
    cipher: CipherSession,
    pub handshake: BytesMut,
}

/// Tunnel implementation block
impl Tunnel {
    /// new is a constructor for the Tunnel type; tunnels start in Auth
    pub fn new(cipher: CipherSession) -> Self {
        Self {
            state: HikariState::Auth,
            packet: PacketContext::new(),
            cipher,
            handshake: BytesMut::new(),
        }
    }

    /// seal encrypts `data` and frames it, splitting payloads that do not
    /// fit a single frame
    pub fn seal(&mut self, data: &[u8]) -> Result<BytesMut, FrameError> {
        let mut out = BytesMut::with_capacity(data.len() + FRAME_OVERHEAD);
        let mut payload = Vec::new();

        for chunk in data.chunks(codec::MAX_PAYLOAD) {
            payload.clear();
            payload.extend_from_slice(chunk);
            self.cipher.encrypt(&mut payload);
            codec::wrap(&payload, &mut out)?;
        }

        Ok(out)
    }

    /// open feeds received bytes to the frame decoder and returns the
    /// decrypted payloads of every frame they completed
    pub fn open(&mut self, mut src: &[u8]) -> Result<BytesMut, FrameError> {
        let mut out = BytesMut::new();

        while let Some(mut payload) = self.packet.unwrap(&mut src)? {
            self.cipher.decrypt(&mut payload);
            out.extend_from_slice(&payload);
        }

        Ok(out)
    }

    pub fn is_buffering(&self) -> bool {
        self.packet.is_buffering()
    }
}

/// ContextKind is the role a socket plays in its pair together with the
/// protocol state that role carries
#[derive(Debug)]
pub enum ContextKind {
    /// A local application speaking SOCKS to the client
    Local(SocksHandshake),
    /// The client's connection to a hikari server
    Remote(Tunnel),
    /// A hikari client as seen by the server
    Client(Tunnel),
    /// The destination the server connected to
    Target,
}

/// ContextKind implementation block
impl ContextKind {
    pub fn name(&self) -> &'static str {
        match self {
            ContextKind::Local(_) => "local",
            ContextKind::Remote(_) => "remote",
            ContextKind::Client(_) => "client",
            ContextKind::Target => "target",
        }
    }

    /// is_tunnel reports whether the socket carries hikari frames
    pub fn is_tunnel(&self) -> bool {
        matches!(self, ContextKind::Remote(_) | ContextKind::Client(_))
    }
}

/// Context is one socket of a pair and its bookkeeping. Write interest is
/// registered exactly when `backlog` holds bytes. Reads stop while the
/// peer has a backlog or while the session holds them
#[derive(Debug)]
pub struct Context {
    stream: Option<TcpStream>,
    pub kind: ContextKind,
    backlog: BytesMut,
    read_enabled: bool,
    held: bool,
    closed: bool,
    target: OnceCell<TargetAddress>,
}

/// Context implementation block
impl Context {
    /// new is a constructor for the Context type
    pub fn new(stream: TcpStream, kind: ContextKind) -> Self {
        Self {
            stream: Some(stream),
            kind,
            backlog: BytesMut::new(),
            read_enabled: true,
            held: false,
            closed: false,
            target: OnceCell::new(),
        }
    }

    pub(crate) fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn wants_read(&self) -> bool {
        !self.closed && self.read_enabled && !self.held
    }

    pub fn wants_write(&self) -> bool {
        !self.closed && !self.backlog.is_empty()
    }

    /// interest is the readiness to wait for, None when there is nothing
    /// to wait for
    pub fn interest(&self) -> Option<Interest> {
        match (self.wants_read(), self.wants_write()) {
            (true, true) => Some(Interest::READABLE.add(Interest::WRITABLE)),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    /// read_limit bounds a single read so one plain read always becomes
    /// exactly one frame
    pub fn read_limit(&self, buffer_size: usize) -> usize {
        if self.kind.is_tunnel() {
            buffer_size + FRAME_OVERHEAD
        } else {
            buffer_size
        }
    }

    pub(crate) fn backlog(&self) -> &[u8] {
        &self.backlog
    }

    pub(crate) fn push_backlog(&mut self, data: &[u8]) {
        self.backlog.extend_from_slice(data);
    }

    /// capture_target records the destination once; later captures are
    /// ignored and reported as false
    pub fn capture_target(&self, target: TargetAddress) -> bool {
        self.target.set(target).is_ok()
    }

    pub fn target(&self) -> Option<&TargetAddress> {
        self.target.get()
    }

    pub fn handshake_mut(&mut self) -> Option<&mut SocksHandshake> {
        match &mut self.kind {
            ContextKind::Local(handshake) => Some(handshake),
            _ => None,
        }
    }

    pub fn tunnel_mut(&mut self) -> Option<&mut Tunnel> {
        match &mut self.kind {
            ContextKind::Remote(tunnel) | ContextKind::Client(tunnel) => Some(tunnel),
            _ => None,
        }
    }

    fn shutdown(&mut self) {
        self.closed = true;
        self.read_enabled = false;
        self.backlog.clear();
        // Dropping the stream releases the socket
        self.stream = None;
    }

    #[cfg(test)]
    pub(crate) fn detached(kind: ContextKind) -> Self {
        Self {
            stream: None,
            kind,
            backlog: BytesMut::new(),
            read_enabled: true,
            held: false,
            closed: false,
            target: OnceCell::new(),
        }
    }
}

/// Pair holds the two contexts of one proxied connection. Slots are
/// addressed by Side and the egress slot stays empty until the outbound
/// connection exists
#[derive(Debug)]
pub struct Pair {
    slots: [Option<Context>; 2],
}

/// Pair implementation block
impl Pair {
    /// new is a constructor for the Pair type
    pub fn new(ingress: Context) -> Self {
        Self {
            slots: [Some(ingress), None],
        }
    }

    /// attach installs the egress context
    pub fn attach(&mut self, egress: Context) {
        self.slots[Side::Egress.index()] = Some(egress);
    }

    pub fn get(&self, side: Side) -> Option<&Context> {
        self.slots[side.index()].as_ref()
    }

    pub fn get_mut(&mut self, side: Side) -> Option<&mut Context> {
        self.slots[side.index()].as_mut()
    }

    pub fn tunnel_mut(&mut self, side: Side) -> Option<&mut Tunnel> {
        self.get_mut(side).and_then(Context::tunnel_mut)
    }

    /// is_closed reports whether the pair is finished. The ingress socket
    /// is always present and closes with either side
    pub fn is_closed(&self) -> bool {
        self.get(Side::Ingress).is_none_or(Context::is_closed)
    }

    /// close releases the socket of `side` and then of its peer. Contexts
    /// already closed are skipped, so closing twice is harmless
    pub fn close(&mut self, side: Side) {
        for side in [side, side.peer()] {
            if let Some(ctx) = self.get_mut(side) {
                if !ctx.closed {
                    // DEBUG
                    debug!("closing {} connection", ctx.kind.name());
                    ctx.shutdown();
                }
            }
        }
    }

    /// hold_reads stops reading `side` until release_reads, independent of
    /// backlog accounting
    pub fn hold_reads(&mut self, side: Side) {
        if let Some(ctx) = self.get_mut(side) {
            ctx.held = true;
        }
    }

    pub fn release_reads(&mut self, side: Side) {
        if let Some(ctx) = self.get_mut(side) {
            ctx.held = false;
        }
    }

    /// record_write accounts for a write of `data` to `dst` that accepted
    /// `written` bytes. The rest is kept in the backlog of `dst` and reads
    /// on the peer pause until it drains
    pub fn record_write(&mut self, dst: Side, data: &[u8], written: usize) {
        if written >= data.len() {
            return;
        }

        if let Some(ctx) = self.get_mut(dst) {
            ctx.push_backlog(&data[written..]);
        }
        if let Some(peer) = self.get_mut(dst.peer()) {
            peer.read_enabled = false;
        }
    }

    /// record_flush accounts for `written` backlog bytes reaching `dst`.
    /// Returns true once the backlog is empty, at which point reads on the
    /// peer resume
    pub fn record_flush(&mut self, dst: Side, written: usize) -> bool {
        let Some(ctx) = self.get_mut(dst) else {
            return true;
        };

        let written = written.min(ctx.backlog.len());
        ctx.backlog.advance(written);
        if !ctx.backlog.is_empty() {
            return false;
        }

        if let Some(peer) = self.get_mut(dst.peer()) {
            if !peer.closed {
                peer.read_enabled = true;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CipherSpec, Endpoint};

    fn pair() -> Pair {
        let mut pair = Pair::new(Context::detached(ContextKind::Target));
        pair.attach(Context::detached(ContextKind::Target));
        pair
    }

    #[test]
    fn close_cascades_once() {
        let mut pair = pair();
        assert!(!pair.is_closed());

        pair.close(Side::Egress);
        assert!(pair.is_closed());
        assert!(pair.get(Side::Ingress).unwrap().is_closed());
        assert!(pair.get(Side::Egress).unwrap().is_closed());

        // Closing again is a no-op
        pair.close(Side::Ingress);
        assert!(pair.get(Side::Ingress).unwrap().interest().is_none());
    }

    #[test]
    fn close_without_egress() {
        let mut pair = Pair::new(Context::detached(ContextKind::Target));
        pair.close(Side::Ingress);
        assert!(pair.is_closed());
        assert!(pair.get(Side::Egress).is_none());
    }

    #[test]
    fn partial_write_pauses_peer_reads() {
        let mut pair = pair();
        pair.record_write(Side::Egress, b"0123456789", 4);

        let egress = pair.get(Side::Egress).unwrap();
        assert_eq!(egress.backlog(), b"456789");
        assert_eq!(egress.interest(), Some(Interest::READABLE.add(Interest::WRITABLE)));
        assert!(!pair.get(Side::Ingress).unwrap().wants_read());

        assert!(!pair.record_flush(Side::Egress, 2));
        assert_eq!(pair.get(Side::Egress).unwrap().backlog(), b"6789");
        assert!(!pair.get(Side::Ingress).unwrap().wants_read());

        assert!(pair.record_flush(Side::Egress, 4));
        let egress = pair.get(Side::Egress).unwrap();
        assert!(!egress.wants_write());
        assert_eq!(egress.interest(), Some(Interest::READABLE));
        assert!(pair.get(Side::Ingress).unwrap().wants_read());
    }

    #[test]
    fn held_reads_survive_backlog_drain() {
        let mut pair = pair();
        pair.hold_reads(Side::Ingress);
        assert_eq!(pair.get(Side::Ingress).unwrap().interest(), None);

        pair.record_write(Side::Egress, b"request", 3);
        assert!(pair.record_flush(Side::Egress, 4));
        assert!(!pair.get(Side::Ingress).unwrap().wants_read());

        pair.release_reads(Side::Ingress);
        assert!(pair.get(Side::Ingress).unwrap().wants_read());

        // Releasing does not override backlog accounting
        pair.record_write(Side::Egress, b"more", 0);
        pair.hold_reads(Side::Ingress);
        pair.release_reads(Side::Ingress);
        assert!(!pair.get(Side::Ingress).unwrap().wants_read());
    }

    #[test]
    fn complete_write_leaves_no_backlog() {
        let mut pair = pair();
        pair.record_write(Side::Ingress, b"abc", 3);
        assert!(!pair.get(Side::Ingress).unwrap().wants_write());
        assert!(pair.get(Side::Egress).unwrap().wants_read());
    }

    #[test]
    fn target_is_captured_once() {
        let ctx = Context::detached(ContextKind::Target);
        assert!(ctx.capture_target(TargetAddress::ipv4([10, 0, 0, 1], 80)));
        assert!(!ctx.capture_target(TargetAddress::ipv4([10, 0, 0, 2], 80)));
        assert_eq!(ctx.target().unwrap().to_string(), "10.0.0.1:80");
    }

    #[test]
    fn tunnels_talk_to_each_other() {
        let spec = CipherSpec::new("aes", "secret").unwrap();
        let mut client = Tunnel::new(spec.session(Endpoint::Client).unwrap());
        let mut server = Tunnel::new(spec.session(Endpoint::Server).unwrap());

        let mut wire = client.seal(b"hello ").unwrap();
        wire.extend_from_slice(&client.seal(b"world").unwrap());

        // Deliver the bytes in two uneven reads
        let (first, second) = wire.split_at(9);
        let mut out = server.open(first).unwrap();
        assert!(server.is_buffering());
        out.extend_from_slice(&server.open(second).unwrap());

        assert_eq!(&out[..], b"hello world");
        assert!(!server.is_buffering());
    }

    #[test]
    fn tunnels_round_trip_every_length() {
        for name in ["plain", "rc4", "aes"] {
            let spec = CipherSpec::new(name, "secret").unwrap();
            let mut client = Tunnel::new(spec.session(Endpoint::Client).unwrap());
            let mut server = Tunnel::new(spec.session(Endpoint::Server).unwrap());

            for len in 0..=4096usize {
                let data: Vec<u8> = (0..len).map(|i| (i + len) as u8).collect();

                let up = client.seal(&data).unwrap();
                assert_eq!(&server.open(&up).unwrap()[..], &data[..], "{} {}", name, len);

                let down = server.seal(&data).unwrap();
                assert_eq!(&client.open(&down).unwrap()[..], &data[..], "{} {}", name, len);
            }
        }
    }

    #[test]
    fn seal_splits_large_payloads() {
        let spec = CipherSpec::new("plain", "secret").unwrap();
        let mut tunnel = Tunnel::new(spec.session(Endpoint::Client).unwrap());

        let data = vec![7u8; codec::MAX_PAYLOAD + 10];
        let wire = tunnel.seal(&data).unwrap();
        assert_eq!(wire.len(), data.len() + 2 * FRAME_OVERHEAD);

        let mut peer = Tunnel::new(spec.session(Endpoint::Server).unwrap());
        assert_eq!(peer.open(&wire).unwrap().len(), data.len());
    }

    #[test]
    fn read_limit_accounts_for_framing() {
        let spec = CipherSpec::new("plain", "secret").unwrap();
        let session = spec.session(Endpoint::Server).unwrap();
        let tunnel = Context::detached(ContextKind::Client(Tunnel::new(session)));
        let plain = Context::detached(ContextKind::Target);
        assert_eq!(tunnel.read_limit(4096), 4096 + FRAME_OVERHEAD);
        assert_eq!(plain.read_limit(4096), 4096);
    }
}
