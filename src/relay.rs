use crate::context::{Context, Pair, Side};
use std::future;
use std::io;
use tokio::io::Ready;
use tracing::debug;

/// Received is the outcome of a non-blocking read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Data(usize),
    WouldBlock,
    Eof,
}

/// Session is the protocol logic driven by `run`. Every chunk read from
/// either socket of the pair is handed to `on_data`
pub(crate) trait Session {
    fn pair(&self) -> &Pair;

    fn pair_mut(&mut self) -> &mut Pair;

    async fn on_data(&mut self, side: Side, data: &[u8]) -> anyhow::Result<()>;
}

/// Pair I/O implementation block
impl Pair {
    /// try_read reads what `side` has available without waiting
    pub fn try_read(&self, side: Side, buf: &mut [u8]) -> io::Result<Received> {
        let Some(stream) = self.get(side).and_then(Context::stream) else {
            return Ok(Received::Eof);
        };

        match stream.try_read(buf) {
            Ok(0) => Ok(Received::Eof),
            Ok(n) => Ok(Received::Data(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Received::WouldBlock),
            Err(e) => Err(e),
        }
    }

    /// send writes `data` to `dst` as far as the socket accepts it and
    /// queues the rest. Bytes for a closed context are dropped
    pub fn send(&mut self, dst: Side, data: &[u8]) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let Some(ctx) = self.get_mut(dst) else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no connection on this side",
            ));
        };
        if ctx.is_closed() {
            return Ok(());
        }

        // Keep ordering behind bytes already waiting
        if ctx.wants_write() {
            ctx.push_backlog(data);
            return Ok(());
        }

        let written = match ctx.stream().map(|stream| stream.try_write(data)) {
            Some(Ok(n)) => n,
            Some(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Some(Err(e)) => return Err(e),
            None => return Ok(()),
        };

        self.record_write(dst, data, written);
        Ok(())
    }

    /// flush writes queued bytes to `dst`. Returns true once nothing is
    /// left
    pub fn flush(&mut self, dst: Side) -> io::Result<bool> {
        let Some(ctx) = self.get(dst) else {
            return Ok(true);
        };
        let Some(stream) = ctx.stream() else {
            return Ok(true);
        };

        let written = match stream.try_write(ctx.backlog()) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(e),
        };

        Ok(self.record_flush(dst, written))
    }
}

/// side_ready waits for the interest of one context. Sides with nothing to
/// wait for never become ready
async fn side_ready(ctx: Option<&Context>) -> io::Result<Ready> {
    let Some((stream, interest)) = ctx.and_then(|ctx| Some((ctx.stream()?, ctx.interest()?)))
    else {
        return future::pending().await;
    };

    stream.ready(interest).await
}

/// next_event waits until either side of the pair is ready
pub(crate) async fn next_event(pair: &Pair) -> (Side, io::Result<Ready>) {
    tokio::select! {
        ready = side_ready(pair.get(Side::Ingress)) => (Side::Ingress, ready),
        ready = side_ready(pair.get(Side::Egress)) => (Side::Egress, ready),
    }
}

/// run drives a session until its pair closes, then makes sure both
/// sockets are released
pub(crate) async fn run<S: Session>(session: &mut S, buffer_size: usize) -> anyhow::Result<()> {
    let result = drive(session, buffer_size).await;
    session.pair_mut().close(Side::Ingress);
    result
}

async fn drive<S: Session>(session: &mut S, buffer_size: usize) -> anyhow::Result<()> {
    let mut buf = vec![0u8; buffer_size + crate::codec::FRAME_OVERHEAD];

    while !session.pair().is_closed() {
        let (side, ready) = next_event(session.pair()).await;
        let ready = ready?;

        let Some(ctx) = session.pair().get(side) else {
            continue;
        };
        let wants_write = ctx.wants_write();
        let wants_read = ctx.wants_read();
        let limit = ctx.read_limit(buffer_size).min(buf.len());

        if ready.is_writable() && wants_write {
            session.pair_mut().flush(side)?;
        }

        if (ready.is_readable() || ready.is_read_closed()) && wants_read {
            match session.pair().try_read(side, &mut buf[..limit])? {
                Received::Data(n) => session.on_data(side, &buf[..n]).await?,
                Received::WouldBlock => {}
                Received::Eof => {
                    // DEBUG
                    debug!("{:?} side reached end of stream", side);
                    session.pair_mut().close(side);
                }
            }
        }
    }

    Ok(())
}
