//! The event loop and its client handle.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, StreamExt, future, pin_mut, select};
use log::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::dispatch::{Action, Completed, Dispatched, QueryId, Report};
use crate::engine::{Diagnostics, Engine};
use crate::errors::Error;
use crate::registry::BulbSummary;
use crate::runtime::{self, AsyncUdpSocket, UdpSocket};
use crate::selector::Selector;

type Result<T> = std::result::Result<T, Error>;

/// Large enough for any datagram of the protocol.
const RECV_BUFFER_SIZE: usize = 4096;

enum Request {
    Execute {
        selector: Selector,
        action: Action,
        reply: oneshot::Sender<Result<Report>>,
    },
    ListBulbs(oneshot::Sender<Vec<BulbSummary>>),
    Diagnostics(oneshot::Sender<Diagnostics>),
    Shutdown,
}

/// Handle for talking to a running [`Daemon`].
///
/// Cheap to clone; every clone feeds the same event loop. Requests are
/// processed one loop turn at a time, in the order they were sent.
#[derive(Debug, Clone)]
pub struct Client {
    requests: mpsc::UnboundedSender<Request>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Execute {
                selector, action, ..
            } => write!(f, "Execute({selector}, {})", action.name()),
            Request::ListBulbs(_) => f.write_str("ListBulbs"),
            Request::Diagnostics(_) => f.write_str("Diagnostics"),
            Request::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl Client {
    fn send(&self, request: Request) -> Result<()> {
        self.requests
            .unbounded_send(request)
            .map_err(|_| Error::DaemonStopped)
    }

    /// Run `action` against every bulb `selector` matches.
    ///
    /// A selector matching nothing yields an empty report. Commands return as
    /// soon as they are sent, queries once every target replied or timed out.
    pub async fn execute(&self, selector: &str, action: Action) -> Result<Report> {
        let selector = Selector::parse(selector)?;
        self.execute_selector(selector, action).await
    }

    pub async fn execute_selector(&self, selector: Selector, action: Action) -> Result<Report> {
        let (reply, response) = oneshot::channel();
        self.send(Request::Execute {
            selector,
            action,
            reply,
        })?;
        response.await.map_err(|_| Error::DaemonStopped)?
    }

    /// Every known bulb, ordered by device id.
    pub async fn list_bulbs(&self) -> Result<Vec<BulbSummary>> {
        let (reply, response) = oneshot::channel();
        self.send(Request::ListBulbs(reply))?;
        response.await.map_err(|_| Error::DaemonStopped)
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        let (reply, response) = oneshot::channel();
        self.send(Request::Diagnostics(reply))?;
        response.await.map_err(|_| Error::DaemonStopped)
    }

    /// Ask the event loop to stop; pending queries are abandoned.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Request::Shutdown)
    }
}

/// Outcome of one wait of the event loop.
enum Event {
    Datagram(std::io::Result<(usize, SocketAddr)>),
    Request(Option<Request>),
    Timer,
}

/// A bound daemon, ready to [`run`](Daemon::run).
///
/// # Examples
///
/// ```no_run
/// use lightsd_rs::{Action, Daemon, DaemonConfig};
///
/// # async fn example() -> Result<(), lightsd_rs::Error> {
/// let daemon = Daemon::bind(DaemonConfig::default()).await?;
/// let client = daemon.client();
///
/// let (result, report) = futures::join!(daemon.run(), async {
///     let report = client.execute("#kitchen", Action::PowerOn).await;
///     client.shutdown()?;
///     report
/// });
/// result?;
/// println!("{} bulbs switched on", report?.succeeded());
/// # Ok(())
/// # }
/// ```
pub struct Daemon {
    socket: UdpSocket,
    engine: Engine,
    requests: mpsc::UnboundedReceiver<Request>,
    client: Client,
}

impl Daemon {
    /// Validate `config` and bind the daemon socket.
    ///
    /// This is the only fallible step of the daemon's life.
    pub async fn bind(config: DaemonConfig) -> Result<Self> {
        config.validate()?;

        let socket = UdpSocket::bind(config.bind)
            .await
            .map_err(|e| Error::socket("bind", e))?;
        socket
            .set_broadcast(true)
            .map_err(|e| Error::socket("set_broadcast", e))?;
        if let Ok(addr) = socket.local_addr() {
            info!("listening on {addr}, probing {}", config.broadcast);
        }

        let (sender, requests) = mpsc::unbounded();
        Ok(Daemon {
            socket,
            engine: Engine::new(&config, Instant::now()),
            requests,
            client: Client { requests: sender },
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::socket("local_addr", e))
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Run the event loop until a client asks for shutdown or every client
    /// is dropped.
    pub async fn run(self) -> Result<()> {
        let Daemon {
            socket,
            mut engine,
            mut requests,
            client,
        } = self;
        drop(client);

        let mut waiters: HashMap<QueryId, oneshot::Sender<Result<Report>>> = HashMap::new();
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let delay = engine
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()));
            let event = {
                let recv = socket.recv_from(&mut buf).fuse();
                let timer = async {
                    match delay {
                        Some(delay) => runtime::sleep(delay).await,
                        None => future::pending().await,
                    }
                }
                .fuse();
                pin_mut!(recv, timer);
                select! {
                    received = recv => Event::Datagram(received),
                    request = requests.next() => Event::Request(request),
                    () = timer => Event::Timer,
                }
            };

            match event {
                Event::Datagram(Ok((len, from))) => {
                    let mut next = Some((len, from));
                    // Drain everything already queued before the next wait.
                    while let Some((len, from)) = next {
                        let completed =
                            engine.on_datagram(&buf[..len], from, &socket, Instant::now());
                        if let Some(completed) = completed {
                            complete(&mut waiters, completed);
                        }
                        next = match socket.recv_from(&mut buf).now_or_never() {
                            Some(Ok(received)) => Some(received),
                            Some(Err(err)) => {
                                debug!("receive failed while draining: {err}");
                                None
                            }
                            None => None,
                        };
                    }
                }
                Event::Datagram(Err(err)) => warn!("receive failed: {err}"),
                Event::Request(Some(Request::Shutdown)) => {
                    info!("shutdown requested");
                    break;
                }
                Event::Request(Some(request)) => {
                    handle_request(&mut engine, &socket, &mut waiters, request)
                }
                Event::Request(None) => {
                    debug!("every client is gone");
                    break;
                }
                Event::Timer => {
                    for completed in engine.on_timer(&socket, Instant::now()) {
                        complete(&mut waiters, completed);
                    }
                }
            }
        }

        engine.shutdown();
        if !waiters.is_empty() {
            debug!("abandoning {} pending queries", waiters.len());
        }
        Ok(())
    }
}

fn handle_request(
    engine: &mut Engine,
    socket: &UdpSocket,
    waiters: &mut HashMap<QueryId, oneshot::Sender<Result<Report>>>,
    request: Request,
) {
    debug!("request {request:?}");
    match request {
        Request::Execute {
            selector,
            action,
            reply,
        } => match engine.execute(&selector, &action, socket, Instant::now()) {
            Dispatched::Complete(report) => {
                let _ = reply.send(Ok(report));
            }
            Dispatched::Pending(id) => {
                waiters.insert(id, reply);
            }
        },
        Request::ListBulbs(reply) => {
            let _ = reply.send(engine.list_bulbs());
        }
        Request::Diagnostics(reply) => {
            let _ = reply.send(engine.diagnostics());
        }
        Request::Shutdown => {}
    }
}

fn complete(
    waiters: &mut HashMap<QueryId, oneshot::Sender<Result<Report>>>,
    completed: Completed,
) {
    if let Some(reply) = waiters.remove(&completed.id) {
        // The client may have given up on the answer.
        let _ = reply.send(Ok(completed.report));
    }
}

#[cfg(all(test, feature = "runtime-tokio"))]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::dispatch::Status;
    use crate::types::{DeviceId, PowerState, SiteId};
    use crate::wire::{self, Header, LightStatus, Packet, Payload, Target};

    const SITE: SiteId = SiteId::new([0x4c, 0x49, 0x46, 0x58, 0x56, 0x32]);
    const DESK: DeviceId = DeviceId::new([0xd0, 0x73, 0xd5, 0, 0, 1]);
    const SHELF: DeviceId = DeviceId::new([0xd0, 0x73, 0xd5, 0, 0, 2]);

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    /// A gateway with two bulbs behind it, answering until dropped.
    ///
    /// Without `answer_queries` only discovery traffic gets a reply.
    async fn fake_gateway(socket: &UdpSocket, answer_queries: bool) {
        let mut power = HashMap::from([(DESK, PowerState::Off), (SHELF, PowerState::Off)]);
        let labels = HashMap::from([(DESK, "desk"), (SHELF, "shelf")]);
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            let (len, from) = socket.recv_from(&mut buf).await.unwrap();
            let request = wire::decode(&buf[..len]).unwrap();
            let sequence = request.header.sequence;
            if !answer_queries && sequence != 0 {
                continue;
            }
            let reply = |target: Target, payload: Payload| {
                let header = Header::new(target, SITE).with_sequence(sequence);
                wire::encode(&Packet::new(header, payload))
            };

            let mut replies = Vec::new();
            match (request.payload, request.header.target) {
                (Payload::GetPanGateway, _) => replies.push(reply(
                    Target::All,
                    Payload::PanGateway {
                        service: 1,
                        port: wire::PORT as u32,
                    },
                )),
                (Payload::GetLightState, target) => {
                    for id in [DESK, SHELF] {
                        if target == Target::All || target == Target::Device(id) {
                            let status = LightStatus {
                                power: power[&id],
                                label: labels[&id].to_string(),
                                ..LightStatus::default()
                            };
                            replies.push(reply(Target::Device(id), Payload::LightStatus(status)));
                        }
                    }
                }
                (Payload::SetPowerState(level), Target::Device(id)) => {
                    power.insert(id, level);
                    replies.push(reply(Target::Device(id), Payload::PowerState(level)));
                }
                _ => {}
            }
            for bytes in replies {
                socket.send_to(&bytes, from).await.unwrap();
            }
        }
    }

    fn config(gateway: SocketAddr) -> DaemonConfig {
        DaemonConfig {
            bind: loopback(),
            broadcast: gateway,
            probe_interval: Duration::from_millis(50),
            sweep_interval: Duration::from_secs(1),
            stale_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_millis(500),
            history_size: 16,
        }
    }

    #[tokio::test]
    async fn test_round_trip_over_loopback() {
        let gateway = UdpSocket::bind(loopback()).await.unwrap();
        let daemon = Daemon::bind(config(gateway.local_addr().unwrap()))
            .await
            .unwrap();
        let client = daemon.client();

        let scenario = async {
            let bulbs = loop {
                let bulbs = client.list_bulbs().await.unwrap();
                if bulbs.len() == 2 {
                    break bulbs;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            };
            assert_eq!(bulbs[0].id, DESK);
            assert_eq!(bulbs[0].label, "desk");
            assert_eq!(bulbs[0].site, Some(SITE));

            let report = client.execute("*", Action::PowerOn).await.unwrap();
            assert_eq!(report.succeeded(), 2);

            let report = client.execute("desk", Action::GetLightState).await.unwrap();
            assert_eq!(report.total(), 1);
            let outcome = report.outcome(&DESK).unwrap();
            assert_eq!(outcome.status, Status::Success);
            assert_eq!(outcome.state.as_ref().unwrap().power, PowerState::On);

            let report = client.execute("#unknown", Action::PowerOff).await.unwrap();
            assert_eq!(report.total(), 0);

            assert!(matches!(
                client.execute("desk,,shelf", Action::PowerOff).await,
                Err(Error::Selector(_))
            ));

            let diagnostics = client.diagnostics().await.unwrap();
            assert_eq!(diagnostics.gateways, 1);
            assert_eq!(diagnostics.bulbs, 2);
            assert!(diagnostics.discovery_cycles >= 1);

            client.shutdown().unwrap();
        };

        let scenario = async {
            tokio::select! {
                _ = fake_gateway(&gateway, true) => unreachable!(),
                result = tokio::time::timeout(Duration::from_secs(5), scenario) => {
                    result.expect("scenario timed out")
                }
            }
        };
        let (result, ()) = tokio::join!(daemon.run(), scenario);
        result.unwrap();

        assert!(matches!(client.list_bulbs().await, Err(Error::DaemonStopped)));
    }

    #[tokio::test]
    async fn test_query_without_reply() {
        let gateway = UdpSocket::bind(loopback()).await.unwrap();
        let daemon = Daemon::bind(config(gateway.local_addr().unwrap()))
            .await
            .unwrap();
        let client = daemon.client();

        let scenario = async {
            while client.list_bulbs().await.unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let report = client.execute("*", Action::GetLightState).await.unwrap();
            assert_eq!(report.total(), 2);
            assert_eq!(report.succeeded(), 0);
            assert_eq!(report.failed_targets(), vec![DESK, SHELF]);
            assert!(
                report
                    .outcomes
                    .iter()
                    .all(|outcome| outcome.status == Status::NoReply)
            );
            client.shutdown().unwrap();
        };

        let scenario = async {
            tokio::select! {
                _ = fake_gateway(&gateway, false) => unreachable!(),
                result = tokio::time::timeout(Duration::from_secs(5), scenario) => {
                    result.expect("scenario timed out")
                }
            }
        };
        let (result, ()) = tokio::join!(daemon.run(), scenario);
        result.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_without_clients() {
        let daemon = Daemon::bind(config(loopback())).await.unwrap();
        drop(daemon.client());
        tokio::time::timeout(Duration::from_secs(1), daemon.run())
            .await
            .expect("daemon kept running")
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = DaemonConfig {
            stale_timeout: Duration::from_millis(10),
            ..config(loopback())
        };
        assert!(matches!(
            Daemon::bind(config).await,
            Err(Error::InvalidConfig(_))
        ));
    }
}
