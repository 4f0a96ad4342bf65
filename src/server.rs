use crate::auth::AuthorizedKeys;
use crate::config::ServerConfig;
use crate::context::{Context, ContextKind, HikariState, Pair, Side, Tunnel};
use crate::crypto::{CipherSpec, Endpoint};
use crate::hikari;
use crate::protocol::HikariReply;
use crate::reactor::{Handler, Reactor, ReactorHandle};
use crate::relay::{self, Session};
use anyhow::{Result, anyhow};
use bytes::Buf;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{info, warn};

/// ServerSettings is shared read-only by every reactor of a server
#[derive(Debug)]
struct ServerSettings {
    keys: AuthorizedKeys,
    cipher: CipherSpec,
    buffer_size: usize,
}

/// ServerHandler serves hikari clients on one reactor
#[derive(Clone)]
pub struct ServerHandler(Arc<ServerSettings>);

impl Handler for ServerHandler {
    fn handle(
        self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> impl Future<Output = Result<()>> + 'static {
        async move {
            // DEBUG
            info!("new client: {}", peer);

            let tunnel = Tunnel::new(self.0.cipher.session(Endpoint::Server)?);
            let buffer_size = self.0.buffer_size;
            let mut session = ServerSession {
                settings: self.0,
                pair: Pair::new(Context::new(stream, ContextKind::Client(tunnel))),
                peer,
            };

            relay::run(&mut session, buffer_size).await
        }
    }
}

/// ServerSession joins a hikari client to the target it asked for
struct ServerSession {
    settings: Arc<ServerSettings>,
    pair: Pair,
    peer: SocketAddr,
}

impl Session for ServerSession {
    fn pair(&self) -> &Pair {
        &self.pair
    }

    fn pair_mut(&mut self) -> &mut Pair {
        &mut self.pair
    }

    async fn on_data(&mut self, side: Side, data: &[u8]) -> Result<()> {
        match side {
            Side::Ingress => self.on_client(data).await,
            Side::Egress => self.on_target(data),
        }
    }
}

/// ServerSession implementation block
impl ServerSession {
    fn tunnel(&mut self) -> Result<&mut Tunnel> {
        self.pair
            .tunnel_mut(Side::Ingress)
            .ok_or_else(|| anyhow!("client connection has no tunnel"))
    }

    async fn on_client(&mut self, data: &[u8]) -> Result<()> {
        let tunnel = self
            .pair
            .tunnel_mut(Side::Ingress)
            .ok_or_else(|| anyhow!("client connection has no tunnel"))?;
        let plain = tunnel.open(data)?;

        if tunnel.state == HikariState::Proxy {
            self.pair.send(Side::Egress, &plain)?;
            return Ok(());
        }

        // Validation order: version, key, address, then the target itself
        tunnel.handshake.extend_from_slice(&plain);
        let (target, leftover) =
            match hikari::parse_auth_request(&tunnel.handshake, &self.settings.keys) {
                Ok(None) => return Ok(()),
                Ok(Some((target, used))) => {
                    tunnel.handshake.advance(used);
                    (target, tunnel.handshake.split())
                }
                Err(e) => {
                    return match e.reply() {
                        Some(reply) => {
                            warn!("refusing {}: {}", self.peer, e);
                            self.refuse(reply)
                        }
                        None => Err(e.into()),
                    };
                }
            };

        if let Some(client) = self.pair.get(Side::Ingress) {
            client.capture_target(target.clone());
        }

        let addr = match target.resolve().await {
            Ok(addr) => addr,
            Err(e) => {
                warn!("failed to resolve {}: {}", target, e);
                return self.refuse(HikariReply::DnsResolveFail);
            }
        };

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("failed to connect to {}: {}", target, e);
                return self.refuse(HikariReply::ConnectTargetFail);
            }
        };
        let bound = stream.local_addr()?;
        self.pair.attach(Context::new(stream, ContextKind::Target));

        let tunnel = self.tunnel()?;
        tunnel.state = HikariState::Proxy;
        let sealed = tunnel.seal(&hikari::encode_auth_ok(bound))?;
        self.pair.send(Side::Ingress, &sealed)?;
        self.pair.send(Side::Egress, &leftover)?;

        // DEBUG
        info!("{} -> {} established", self.peer, target);
        Ok(())
    }

    fn on_target(&mut self, data: &[u8]) -> Result<()> {
        let sealed = self.tunnel()?.seal(data)?;
        self.pair.send(Side::Ingress, &sealed)?;
        Ok(())
    }

    /// refuse answers the client with a failure reply and closes
    fn refuse(&mut self, reply: HikariReply) -> Result<()> {
        let sealed = self.tunnel()?.seal(&hikari::encode_auth_fail(reply))?;
        self.pair.send(Side::Ingress, &sealed)?;
        self.pair.close(Side::Ingress);
        Ok(())
    }
}

/// Server is the hikari relay, one reactor per listen port
pub struct Server {
    listen_address: String,
    listen_ports: Vec<u16>,
    settings: Arc<ServerSettings>,
}

/// Server implementation block
impl Server {
    /// new validates `config` and prepares the cipher and key set
    pub fn new(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let cipher = CipherSpec::new(&config.encrypt_type, &config.secret)?;

        Ok(Self {
            listen_address: config.listen_address.clone(),
            listen_ports: config.listen_port_list.clone(),
            settings: Arc::new(ServerSettings {
                keys: AuthorizedKeys::from_keys(&config.private_key_list),
                cipher,
                buffer_size: config.buffer_size,
            }),
        })
    }

    /// start binds every listen port and runs a reactor for each. If any
    /// port fails to bind, the reactors already started are stopped
    pub fn start(self) -> Result<Vec<ReactorHandle>> {
        let mut handles = Vec::with_capacity(self.listen_ports.len());

        for &port in &self.listen_ports {
            let reactor = Reactor::bind((self.listen_address.as_str(), port))?;

            // DEBUG
            info!(
                "hikari server on {} using {} with {} keys",
                reactor.local_addr(),
                self.settings.cipher.kind(),
                self.settings.keys.len()
            );

            let settings = Arc::clone(&self.settings);
            handles.push(reactor.spawn(move || ServerHandler(settings))?);
        }

        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            listen_address: "127.0.0.1".into(),
            listen_port_list: vec![0, 0],
            private_key_list: vec!["hikari".into()],
            buffer_size: 4096,
            encrypt_type: "plain".into(),
            secret: "secret".into(),
        }
    }

    #[test]
    fn one_reactor_per_port() {
        let handles = Server::new(&config()).unwrap().start().unwrap();
        assert_eq!(handles.len(), 2);
        assert_ne!(handles[0].local_addr(), handles[1].local_addr());

        for handle in handles {
            handle.stop();
            handle.join().unwrap();
        }
    }

    #[test]
    fn server_rejects_bad_config() {
        let mut config = config();
        config.private_key_list.clear();
        assert!(Server::new(&config).is_err());
    }
}
