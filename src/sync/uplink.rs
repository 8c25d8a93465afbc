//! The uplink loop.
//!
//! Walks the configured uplinks in priority order, forever. Each attempt
//! opens TCP (and TLS), builds a fresh [`Session`] and runs one `select!`
//! loop over the socket, the next timer deadline and the shutdown signal
//! until the link drops. Between attempts it waits the configured delay.
//! Persistent timers are carried from one session to the next.

use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use slsvc_proto::LineCodec;
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tokio::sync::broadcast;
use tokio::time::{sleep, sleep_until, timeout};
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, error, info, trace, warn};

use super::link::LinkState;
use super::session::{Identity, LinkSettings, Session};
use super::stream::UplinkStream;
use super::tls::connect_tls;
use crate::config::{Config, UplinkBlock};
use crate::error::UplinkError;
use crate::event::{Dispatcher, Event};
use crate::protocol::{self, UidGenerator};
use crate::services::{self, Service};
use crate::telemetry::spans;
use crate::timer::Timers;

type Transport = Framed<UplinkStream, LineCodec>;

/// How a connection ended.
#[derive(Debug)]
enum Ended {
    /// The process is shutting down.
    Shutdown,
    /// The link dropped; try the next uplink.
    Dropped(UplinkError),
}

/// Owns everything that outlives a single connection.
pub struct Uplink {
    config: Config,
    dispatcher: Dispatcher<Session>,
    uids: UidGenerator,
    services: Vec<Rc<dyn Service>>,
    services_started: bool,
    /// Persistent timers, lent to each connection's session.
    timers: Timers,
    cursor: usize,
}

impl Uplink {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            dispatcher: Dispatcher::new(),
            uids: UidGenerator::new(),
            services: Vec::new(),
            services_started: false,
            timers: Timers::new(),
            cursor: 0,
        }
    }

    /// Access to the dispatcher, to register handlers before [`run`](Self::run).
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<Session> {
        &mut self.dispatcher
    }

    /// Connect, serve, reconnect, until `shutdown` fires.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) {
        let uplinks = self.config.uplinks_by_priority();
        if uplinks.is_empty() {
            error!("No uplinks configured");
            return;
        }
        let delay = self.config.connection.reconnect_delay();

        loop {
            let block = uplinks[self.cursor % uplinks.len()].clone();
            self.cursor = (self.cursor + 1) % uplinks.len();

            let span = spans::uplink(&block.name, &block.address(), &block.protocol.to_string());
            let ended = self.attempt(&block, &mut shutdown).instrument(span).await;
            match ended {
                Ended::Shutdown => {
                    info!("Uplink loop stopped");
                    return;
                }
                Ended::Dropped(e) => warn!(
                    uplink = %block.name,
                    error = %e,
                    code = e.error_code(),
                    retry_secs = delay.as_secs(),
                    "Uplink lost"
                ),
            }

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Shutdown while waiting to reconnect");
                    return;
                }
            }
        }
    }

    /// One connection, start to finish.
    async fn attempt(
        &mut self,
        block: &UplinkBlock,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Ended {
        let mut session = self.session_for(block);
        session.set_state(LinkState::Connecting);
        info!(tls = block.tls, "Connecting to uplink");

        let stream = tokio::select! {
            opened = open(block, &self.config) => match opened {
                Ok(stream) => stream,
                Err(e) => return Ended::Dropped(e),
            },
            _ = shutdown.recv() => return Ended::Shutdown,
        };
        info!(
            tls = stream.is_tls(),
            dialect = session.dialect().name(),
            "Connected to uplink"
        );

        session.timers = std::mem::take(&mut self.timers);
        if !self.services_started {
            self.start_services();
        }
        session.events.post(Event::Connected {
            address: block.address(),
        });
        session.greet();
        self.dispatcher.drain(&mut session);

        let max_len = self.config.connection.max_line_len;
        let mut framed = Framed::new(stream, LineCodec::with_max_len(max_len));
        let ended = match self.serve(&mut session, &mut framed, shutdown).await {
            Ok(()) => Ended::Shutdown,
            Err(e) => Ended::Dropped(e),
        };

        let reason = match &ended {
            Ended::Shutdown => "Shutting down".to_string(),
            Ended::Dropped(e) => e.to_string(),
        };
        session.teardown(&reason);
        self.dispatcher.drain(&mut session);
        self.dispatcher.clear_handlers();
        session.timers.clear_transient();
        self.timers = std::mem::take(&mut session.timers);
        ended
    }

    /// The per-connection loop. Returns `Ok` only on shutdown.
    async fn serve(
        &mut self,
        session: &mut Session,
        framed: &mut Transport,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), UplinkError> {
        let ceiling = self.config.connection.timer_ceiling();
        flush(framed, session).await?;

        loop {
            let now = Instant::now();
            let wake = session
                .timers
                .next_deadline()
                .map_or(now + ceiling, |d| d.min(now + ceiling));

            tokio::select! {
                line = framed.next() => match line {
                    Some(Ok(line)) => {
                        session.receive(&line)?;
                        self.dispatcher.drain(session);
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(UplinkError::Closed),
                },
                _ = sleep_until(wake.into()) => {
                    session.run_timers(Instant::now());
                    self.dispatcher.drain(session);
                }
                _ = shutdown.recv() => {
                    info!("Shutdown requested");
                    session.events.post(Event::Exit {
                        reason: "Shutting down".into(),
                    });
                    self.dispatcher.drain(session);
                    flush(framed, session).await?;
                    return Ok(());
                }
            }

            flush(framed, session).await?;
        }
    }

    fn session_for(&self, block: &UplinkBlock) -> Session {
        let server = &self.config.server;
        let identity = Identity {
            name: server.name.clone(),
            description: server.description.clone(),
            sid: server.sid.clone(),
        };
        let link = LinkSettings {
            uplink_name: block.name.clone(),
            send_password: block.send_password.clone(),
            receive_password: block.receive_password.clone(),
            max_modes: block.max_modes,
        };
        Session::new(
            protocol::for_protocol(block.protocol),
            identity,
            link,
            self.config.network.casemapping,
            self.uids.clone(),
        )
    }

    fn start_services(&mut self) {
        self.services = services::from_config(&self.config);
        for service in &self.services {
            info!(service = service.name(), "Starting service");
            Rc::clone(service).register(&mut self.dispatcher);
        }
        self.services_started = true;
    }
}

/// Write everything the session has queued.
async fn flush(framed: &mut Transport, session: &mut Session) -> Result<(), UplinkError> {
    let lines: Vec<String> = session.drain_sendq().collect();
    if lines.is_empty() {
        return Ok(());
    }
    for line in lines {
        trace!(%line, "Sending");
        framed.feed(line).await?;
    }
    framed.flush().await?;
    Ok(())
}

/// Open TCP and, when configured, TLS, all under the connect timeout.
async fn open(block: &UplinkBlock, config: &Config) -> Result<UplinkStream, UplinkError> {
    let limit = config.connection.connect_timeout();
    timeout(limit, open_transport(block))
        .await
        .map_err(|_| UplinkError::ConnectTimeout(block.address()))?
}

async fn open_transport(block: &UplinkBlock) -> Result<UplinkStream, UplinkError> {
    let tcp = connect_tcp(block).await?;
    tcp.set_nodelay(true)?;
    if block.tls {
        let tls = connect_tls(tcp, block).await?;
        Ok(UplinkStream::Tls(Box::new(tls)))
    } else {
        Ok(UplinkStream::Plain(tcp))
    }
}

async fn connect_tcp(block: &UplinkBlock) -> Result<TcpStream, UplinkError> {
    let local: Option<IpAddr> = match &block.bind {
        Some(bind) => Some(bind.parse().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("bad bind address {bind}"),
            )
        })?),
        None => None,
    };

    let mut last_err = None;
    for addr in lookup_host((block.host.as_str(), block.port)).await? {
        if local.is_some_and(|ip| ip.is_ipv4() != addr.is_ipv4()) {
            continue;
        }
        debug!(%addr, "Trying address");
        match connect_addr(addr, local).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "Address failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no usable address for {}", block.address()),
            )
        })
        .into())
}

async fn connect_addr(addr: SocketAddr, local: Option<IpAddr>) -> std::io::Result<TcpStream> {
    let Some(local) = local else {
        return TcpStream::connect(addr).await;
    };
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.bind(SocketAddr::new(local, 0))?;
    socket.connect(addr).await
}
