use crate::address::TargetAddress;
use crate::auth::{self, KeyHash};
use crate::config::ClientConfig;
use crate::context::{Context, ContextKind, HikariState, Pair, Side, Tunnel};
use crate::crypto::{CipherSpec, Endpoint};
use crate::hikari::{self, AuthResponse};
use crate::protocol::{ReplyCode, Version};
use crate::reactor::{Handler, Reactor, ReactorHandle};
use crate::relay::{self, Session};
use crate::socks::{self, SocksHandshake, SocksState, SocksStep};
use anyhow::{Result, anyhow, bail};
use bytes::{Buf, BytesMut};
use std::cell::Cell;
use std::future::Future;
use std::net::SocketAddr;
use std::rc::Rc;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Upstreams rotates through the configured server ports, one step per
/// new connection
#[derive(Debug)]
pub struct Upstreams {
    addrs: Vec<(String, u16)>,
    cursor: Cell<usize>,
}

/// Upstreams implementation block
impl Upstreams {
    /// new is a constructor for the Upstreams type
    pub fn new(host: &str, ports: &[u16]) -> Self {
        Self {
            addrs: ports.iter().map(|&port| (host.to_string(), port)).collect(),
            cursor: Cell::new(0),
        }
    }

    /// next returns the upstream to use and advances the cursor, wrapping
    /// at the end of the list
    pub fn next(&self) -> Option<&(String, u16)> {
        if self.addrs.is_empty() {
            return None;
        }

        let index = self.cursor.get() % self.addrs.len();
        self.cursor.set((index + 1) % self.addrs.len());
        self.addrs.get(index)
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// ClientSettings is the validated, immutable part of a client config
#[derive(Debug, Clone)]
struct ClientSettings {
    server_address: String,
    server_ports: Vec<u16>,
    key: KeyHash,
    cipher: CipherSpec,
    buffer_size: usize,
    local_dns_resolve: bool,
}

struct Shared {
    settings: ClientSettings,
    upstreams: Upstreams,
}

/// ClientHandler serves local applications on one reactor
#[derive(Clone)]
pub struct ClientHandler(Rc<Shared>);

/// ClientHandler implementation block
impl ClientHandler {
    fn new(settings: ClientSettings) -> Self {
        let upstreams = Upstreams::new(&settings.server_address, &settings.server_ports);
        Self(Rc::new(Shared {
            settings,
            upstreams,
        }))
    }
}

impl Handler for ClientHandler {
    fn handle(
        self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> impl Future<Output = Result<()>> + 'static {
        async move {
            // DEBUG
            info!("new client: {}", peer);

            let buffer_size = self.0.settings.buffer_size;
            let local = Context::new(stream, ContextKind::Local(SocksHandshake::new(buffer_size)));
            let mut session = ClientSession {
                shared: self.0,
                pair: Pair::new(local),
                peer,
            };

            relay::run(&mut session, buffer_size).await
        }
    }
}

/// ClientSession joins a local application to a hikari server
struct ClientSession {
    shared: Rc<Shared>,
    pair: Pair,
    peer: SocketAddr,
}

impl Session for ClientSession {
    fn pair(&self) -> &Pair {
        &self.pair
    }

    fn pair_mut(&mut self) -> &mut Pair {
        &mut self.pair
    }

    async fn on_data(&mut self, side: Side, data: &[u8]) -> Result<()> {
        match side {
            Side::Ingress => self.on_local(data).await,
            Side::Egress => self.on_remote(data),
        }
    }
}

/// ClientSession implementation block
impl ClientSession {
    fn handshake(&mut self) -> Result<&mut SocksHandshake> {
        self.pair
            .get_mut(Side::Ingress)
            .and_then(Context::handshake_mut)
            .ok_or_else(|| anyhow!("local connection has no SOCKS state"))
    }

    fn tunnel(&mut self) -> Result<&mut Tunnel> {
        self.pair
            .tunnel_mut(Side::Egress)
            .ok_or_else(|| anyhow!("no tunnel to the server"))
    }

    fn version(&mut self) -> Version {
        self.handshake()
            .ok()
            .and_then(|handshake| handshake.version())
            .unwrap_or(Version::SOCKS5)
    }

    fn target_name(&self) -> String {
        self.pair
            .get(Side::Ingress)
            .and_then(Context::target)
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown target".to_string())
    }

    async fn on_local(&mut self, data: &[u8]) -> Result<()> {
        if self.handshake()?.state() == SocksState::Proxy {
            let sealed = self.tunnel()?.seal(data)?;
            self.pair.send(Side::Egress, &sealed)?;
            return Ok(());
        }

        self.handshake()?.feed(data);
        loop {
            match self.handshake()?.advance()? {
                SocksStep::Pending => return Ok(()),
                SocksStep::Reply(reply) => self.pair.send(Side::Ingress, &reply)?,
                SocksStep::Reject(reply) => {
                    self.pair.send(Side::Ingress, &reply)?;
                    self.pair.close(Side::Ingress);
                    return Ok(());
                }
                SocksStep::Connect(target) => {
                    // Anything more the application sends waits in its socket
                    self.pair.hold_reads(Side::Ingress);
                    return self.open_tunnel(target).await;
                }
            }
        }
    }

    /// open_tunnel connects to the next upstream and sends the auth request
    /// for `target`
    async fn open_tunnel(&mut self, target: TargetAddress) -> Result<()> {
        let shared = Rc::clone(&self.shared);
        if let Some(local) = self.pair.get(Side::Ingress) {
            local.capture_target(target.clone());
        }

        let mut request_target = target;
        if shared.settings.local_dns_resolve && request_target.is_domain() {
            match request_target.resolve().await {
                Ok(addr) => request_target = TargetAddress::from(addr),
                Err(e) => {
                    warn!("failed to resolve {}: {}", request_target, e);
                    return self.reject(ReplyCode::HostUnreachable);
                }
            }
        }

        let Some((host, port)) = shared.upstreams.next() else {
            bail!("no upstream server configured");
        };

        let stream = match TcpStream::connect((host.as_str(), *port)).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("failed to connect to server {}:{}: {}", host, port, e);
                return self.reject(ReplyCode::HostUnreachable);
            }
        };

        let mut tunnel = Tunnel::new(shared.settings.cipher.session(Endpoint::Client)?);
        let request = hikari::encode_auth_request(&shared.settings.key, &request_target);
        let sealed = tunnel.seal(&request)?;

        self.pair.attach(Context::new(stream, ContextKind::Remote(tunnel)));
        self.pair.send(Side::Egress, &sealed)?;
        Ok(())
    }

    fn on_remote(&mut self, data: &[u8]) -> Result<()> {
        let tunnel = self.tunnel()?;
        let plain = tunnel.open(data)?;

        if tunnel.state == HikariState::Proxy {
            self.pair.send(Side::Ingress, &plain)?;
            return Ok(());
        }

        tunnel.handshake.extend_from_slice(&plain);
        match hikari::parse_auth_response(&tunnel.handshake) {
            Ok(None) => Ok(()),
            Ok(Some((AuthResponse::Ok(bound), used))) => {
                tunnel.handshake.advance(used);
                let leftover = tunnel.handshake.split();
                tunnel.state = HikariState::Proxy;
                self.establish(bound, leftover)
            }
            Ok(Some((AuthResponse::Fail(reply), _))) => {
                warn!("server refused {}: {:?}", self.target_name(), reply);
                self.reject(hikari::socks5_reply_for(reply))
            }
            Err(e) => {
                warn!("bad auth response from server: {}", e);
                self.reject(ReplyCode::GeneralFailure)
            }
        }
    }

    /// establish answers the application once the server accepted, then
    /// forwards whatever either side sent in the meantime
    fn establish(&mut self, bound: TargetAddress, leftover: BytesMut) -> Result<()> {
        let handshake = self.handshake()?;
        handshake.complete();
        let version = handshake.version().unwrap_or(Version::SOCKS5);
        let early = handshake.take_early_data();

        let reply = socks::success_reply(version, &bound);
        self.pair.send(Side::Ingress, &reply)?;
        self.pair.send(Side::Ingress, &leftover)?;

        if !early.is_empty() {
            let sealed = self.tunnel()?.seal(&early)?;
            self.pair.send(Side::Egress, &sealed)?;
        }
        self.pair.release_reads(Side::Ingress);

        // DEBUG
        info!("{} -> {} established", self.peer, self.target_name());
        Ok(())
    }

    /// reject answers the application with a failure reply and closes
    fn reject(&mut self, code: ReplyCode) -> Result<()> {
        let reply = socks::failure_reply(self.version(), code);
        self.pair.send(Side::Ingress, &reply)?;
        self.pair.close(Side::Ingress);
        Ok(())
    }
}

/// Client is the local SOCKS4/5 proxy
pub struct Client {
    listen_address: String,
    listen_port: u16,
    settings: ClientSettings,
}

/// Client implementation block
impl Client {
    /// new validates `config` and prepares the cipher and key hash
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let cipher = CipherSpec::new(&config.encrypt_type, &config.secret)?;

        Ok(Self {
            listen_address: config.listen_address.clone(),
            listen_port: config.listen_port,
            settings: ClientSettings {
                server_address: config.server_address.clone(),
                server_ports: config.server_port_list.clone(),
                key: auth::key_hash(&config.private_key),
                cipher,
                buffer_size: config.buffer_size,
                local_dns_resolve: config.local_dns_resolve,
            },
        })
    }

    /// start binds the listen address and runs the client on its own
    /// reactor
    pub fn start(self) -> Result<ReactorHandle> {
        let reactor = Reactor::bind((self.listen_address.as_str(), self.listen_port))?;

        // DEBUG
        info!(
            "hikari client on {} using {} via {}:{:?}",
            reactor.local_addr(),
            self.settings.cipher.kind(),
            self.settings.server_address,
            self.settings.server_ports
        );

        let settings = self.settings;
        reactor.spawn(move || ClientHandler::new(settings))
    }
}
