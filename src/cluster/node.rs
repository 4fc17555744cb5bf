//! Concrete cluster node: listener, peer tables, and join/leave plumbing.
//!
//! # Responsibilities
//! - Bind the cluster listener and answer JOIN/LEAVE lines from peers
//! - Contact peers for startup and background joins
//! - Re-announce to known peers once initial registration completes
//! - Surface fatal conditions on the event channels
//!
//! # Design Decisions
//! - One line of text per exchange; no gossip, consensus, or replication
//! - Peer tables are keyed by the address we contacted or were told
//! - Identity and the bound listener address survive config reloads

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::cluster::retry::run_retry_join;
use crate::cluster::{
    cancelled, Cluster, ClusterEvents, EventSenders, JoinError, LeaveError, ReloadError, StartError,
};
use crate::config::{loader, AgentConfig};

/// How long a single peer exchange (connect, write, response) may take.
const CONTACT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a best-effort leave notification may take per peer.
const LEAVE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive accept failures tolerated before the listener gives up.
const MAX_ACCEPT_ERRORS: u32 = 8;

/// How often the announcer refreshes known peers after registration.
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(60);

/// Which peer pool an exchange concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Lan,
    Wan,
}

impl Pool {
    fn as_str(self) -> &'static str {
        match self {
            Pool::Lan => "lan",
            Pool::Wan => "wan",
        }
    }
}

impl std::fmt::Display for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed inbound request line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Request {
    Join {
        pool: Pool,
        name: String,
        addr: String,
    },
    Leave {
        name: String,
    },
}

pub(crate) fn parse_request(line: &str) -> Option<Request> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "JOIN" => {
            let pool = match parts.next()? {
                "lan" => Pool::Lan,
                "wan" => Pool::Wan,
                _ => return None,
            };
            let name = parts.next()?.to_string();
            let addr = parts.next()?.to_string();
            Some(Request::Join { pool, name, addr })
        }
        "LEAVE" => parts.next().map(|name| Request::Leave {
            name: name.to_string(),
        }),
        _ => None,
    }
}

/// The cluster-member node. Thin by design: it implements exactly the entry
/// points the lifecycle controller drives, over a line protocol.
pub struct Node {
    config: ArcSwap<AgentConfig>,
    reload_path: Option<PathBuf>,
    peers_lan: Arc<DashMap<String, String>>,
    peers_wan: Arc<DashMap<String, String>>,
    events: EventSenders,
    stop: watch::Sender<bool>,
    synced: watch::Sender<bool>,
    started: AtomicBool,
    left: AtomicBool,
    bound: OnceLock<SocketAddr>,
    rng: StdRng,
}

impl Node {
    /// Build a node and the event channel bundle the control loop consumes.
    pub fn new(
        config: AgentConfig,
        reload_path: Option<PathBuf>,
        rng: StdRng,
    ) -> (Self, ClusterEvents) {
        let (senders, events) = ClusterEvents::channel();
        let (stop, _) = watch::channel(false);
        let (synced, _) = watch::channel(false);
        let node = Self {
            config: ArcSwap::from_pointee(config),
            reload_path,
            peers_lan: Arc::new(DashMap::new()),
            peers_wan: Arc::new(DashMap::new()),
            events: senders,
            stop,
            synced,
            started: AtomicBool::new(false),
            left: AtomicBool::new(false),
            bound: OnceLock::new(),
            rng,
        };
        (node, events)
    }

    /// Address the cluster listener actually bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.get().copied()
    }

    /// Peers currently known in the given pool.
    pub fn peer_count(&self, pool: Pool) -> usize {
        match pool {
            Pool::Lan => self.peers_lan.len(),
            Pool::Wan => self.peers_wan.len(),
        }
    }

    fn peers(&self, pool: Pool) -> &Arc<DashMap<String, String>> {
        match pool {
            Pool::Lan => &self.peers_lan,
            Pool::Wan => &self.peers_wan,
        }
    }

    async fn join(&self, pool: Pool, addrs: &[String]) -> Result<usize, JoinError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(JoinError::NotStarted);
        }
        let config = self.config.load_full();
        contact_pool(
            &config.node.name,
            config.advertise_address(),
            pool,
            addrs,
            self.peers(pool),
        )
        .await
    }
}

#[async_trait]
impl Cluster for Node {
    async fn start(&mut self, mut cancel: watch::Receiver<bool>) -> Result<(), StartError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StartError::AlreadyStarted);
        }

        let config = self.config.load_full();
        let bind: SocketAddr = config
            .network
            .bind_address
            .parse()
            .map_err(|_| StartError::InvalidBindAddress(config.network.bind_address.clone()))?;

        let listener = tokio::select! {
            res = TcpListener::bind(bind) => res?,
            _ = cancelled(&mut cancel) => return Err(StartError::Aborted),
        };
        let local = listener.local_addr()?;
        let _ = self.bound.set(local);

        tracing::info!(address = %local, "Cluster listener bound");

        if *cancel.borrow() {
            return Err(StartError::Aborted);
        }

        tokio::spawn(accept_loop(
            listener,
            config.node.name.clone(),
            Arc::clone(&self.peers_lan),
            Arc::clone(&self.peers_wan),
            self.stop.subscribe(),
            self.events.failed.clone(),
        ));

        tokio::spawn(announce_loop(
            config.node.name.clone(),
            config.advertise_address().to_string(),
            Arc::clone(&self.peers_lan),
            Arc::clone(&self.peers_wan),
            self.synced.subscribe(),
            self.stop.subscribe(),
        ));

        if !config.join.retry_join.is_empty() {
            let mut seed = [0u8; 32];
            self.rng.fill(&mut seed);
            let task_rng = StdRng::from_seed(seed);
            tokio::spawn(run_retry_join(
                config.join.clone(),
                config.node.name.clone(),
                config.advertise_address().to_string(),
                Arc::clone(&self.peers_lan),
                self.events.retry_join_failed.clone(),
                self.stop.subscribe(),
                task_rng,
            ));
        }

        Ok(())
    }

    async fn join_lan(&self, addrs: &[String]) -> Result<usize, JoinError> {
        self.join(Pool::Lan, addrs).await
    }

    async fn join_wan(&self, addrs: &[String]) -> Result<usize, JoinError> {
        self.join(Pool::Wan, addrs).await
    }

    fn start_sync(&self) {
        let _ = self.synced.send(true);
        tracing::debug!("Initial registration marked complete");
    }

    async fn leave(&self) -> Result<(), LeaveError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(LeaveError::NotStarted);
        }
        if self.left.swap(true, Ordering::SeqCst) {
            return Err(LeaveError::AlreadyLeft);
        }

        let config = self.config.load_full();
        tracing::info!(node = %config.node.name, "Leaving cluster");

        let mut peer_addrs: Vec<String> = self
            .peers_lan
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        peer_addrs.extend(self.peers_wan.iter().map(|entry| entry.key().clone()));

        for addr in peer_addrs {
            if let Err(err) = notify_leave(&addr, &config.node.name).await {
                tracing::debug!(peer = %addr, error = %err, "Leave notification failed");
            }
        }

        self.peers_lan.clear();
        self.peers_wan.clear();
        let _ = self.stop.send(true);
        let _ = self.events.shutdown.try_send(());
        Ok(())
    }

    async fn reload_config(&self) -> Result<(), ReloadError> {
        let path = self.reload_path.as_ref().ok_or(ReloadError::NoConfigSource)?;
        let mut fresh = loader::load_config(path)?;

        // Identity and the bound listener address are fixed for the life of
        // the process.
        let current = self.config.load_full();
        fresh.node.name = current.node.name.clone();
        fresh.node.id = current.node.id;
        fresh.network.bind_address = current.network.bind_address.clone();

        self.config.store(Arc::new(fresh));
        tracing::info!(path = %path.display(), "Configuration reloaded");
        Ok(())
    }

    fn config(&self) -> Arc<AgentConfig> {
        self.config.load_full()
    }
}

/// Contact every address in `addrs` once; registered peers land in `peers`.
pub(crate) async fn contact_pool(
    local_name: &str,
    advertise: &str,
    pool: Pool,
    addrs: &[String],
    peers: &DashMap<String, String>,
) -> Result<usize, JoinError> {
    let mut contacted = 0;
    let mut last_error = String::new();

    for addr in addrs {
        match contact_peer(local_name, advertise, pool, addr).await {
            Ok(peer_name) => {
                tracing::debug!(peer = %addr, peer_name = %peer_name, pool = %pool, "Peer contacted");
                peers.insert(addr.clone(), peer_name);
                contacted += 1;
            }
            Err(err) => {
                tracing::warn!(peer = %addr, pool = %pool, error = %err, "Failed to contact peer");
                last_error = err.to_string();
            }
        }
    }

    if contacted == 0 && !addrs.is_empty() {
        return Err(JoinError::NoPeers {
            attempted: addrs.len(),
            last: last_error,
        });
    }
    Ok(contacted)
}

async fn contact_peer(
    local_name: &str,
    advertise: &str,
    pool: Pool,
    addr: &str,
) -> io::Result<String> {
    let stream = connect(addr, CONTACT_TIMEOUT).await?;
    let (reader, mut writer) = stream.into_split();

    let request = format!("JOIN {} {} {}\n", pool, local_name, advertise);
    writer.write_all(request.as_bytes()).await?;

    let line = read_response(reader, CONTACT_TIMEOUT).await?;
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("OK") => parts
            .next()
            .map(str::to_string)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "peer sent no name")),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "peer rejected join",
        )),
    }
}

async fn notify_leave(addr: &str, local_name: &str) -> io::Result<()> {
    let stream = connect(addr, LEAVE_NOTIFY_TIMEOUT).await?;
    let (reader, mut writer) = stream.into_split();
    writer
        .write_all(format!("LEAVE {}\n", local_name).as_bytes())
        .await?;
    read_response(reader, LEAVE_NOTIFY_TIMEOUT).await?;
    Ok(())
}

async fn connect(addr: &str, limit: Duration) -> io::Result<TcpStream> {
    tokio::time::timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?
}

async fn read_response(
    reader: tokio::net::tcp::OwnedReadHalf,
    limit: Duration,
) -> io::Result<String> {
    let mut line = String::new();
    tokio::time::timeout(limit, BufReader::new(reader).read_line(&mut line))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "response timed out"))??;
    Ok(line)
}

async fn accept_loop(
    listener: TcpListener,
    node_name: String,
    peers_lan: Arc<DashMap<String, String>>,
    peers_wan: Arc<DashMap<String, String>>,
    mut stop: watch::Receiver<bool>,
    failed: tokio::sync::mpsc::Sender<()>,
) {
    let mut consecutive_errors = 0u32;
    loop {
        tokio::select! {
            _ = cancelled(&mut stop) => {
                tracing::debug!("Cluster listener stopping");
                return;
            }
            res = listener.accept() => match res {
                Ok((stream, peer_addr)) => {
                    consecutive_errors = 0;
                    tracing::trace!(peer_addr = %peer_addr, "Connection accepted");
                    tokio::spawn(handle_connection(
                        stream,
                        node_name.clone(),
                        Arc::clone(&peers_lan),
                        Arc::clone(&peers_wan),
                    ));
                }
                Err(err) => {
                    consecutive_errors += 1;
                    tracing::warn!(error = %err, consecutive_errors, "Accept failed");
                    if consecutive_errors >= MAX_ACCEPT_ERRORS {
                        tracing::error!("Cluster listener failing persistently");
                        let _ = failed.try_send(());
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    node_name: String,
    peers_lan: Arc<DashMap<String, String>>,
    peers_wan: Arc<DashMap<String, String>>,
) {
    let peer_addr = stream.peer_addr().ok();
    let (reader, writer) = stream.into_split();

    let mut line = String::new();
    let read = tokio::time::timeout(
        CONTACT_TIMEOUT,
        BufReader::new(reader).read_line(&mut line),
    )
    .await;
    match read {
        Ok(Ok(n)) if n > 0 => {}
        _ => return,
    }

    let reply = match parse_request(&line) {
        Some(Request::Join { pool, name, addr }) => {
            tracing::debug!(peer = %name, addr = %addr, pool = %pool, "Peer joined");
            match pool {
                Pool::Lan => peers_lan.insert(addr, name),
                Pool::Wan => peers_wan.insert(addr, name),
            };
            format!("OK {}\n", node_name)
        }
        Some(Request::Leave { name }) => {
            tracing::info!(peer = %name, "Peer left");
            peers_lan.retain(|_, peer| peer != &name);
            peers_wan.retain(|_, peer| peer != &name);
            format!("OK {}\n", node_name)
        }
        None => {
            tracing::debug!(peer_addr = ?peer_addr, line = %line.trim_end(), "Unknown request");
            "ERR unknown command\n".to_string()
        }
    };

    send_reply(writer, &reply).await;
}

async fn send_reply(mut writer: OwnedWriteHalf, reply: &str) {
    if let Err(err) = writer.write_all(reply.as_bytes()).await {
        tracing::trace!(error = %err, "Failed to send reply");
    }
}

/// Refresh known peers periodically once initial registration completes.
async fn announce_loop(
    node_name: String,
    advertise: String,
    peers_lan: Arc<DashMap<String, String>>,
    peers_wan: Arc<DashMap<String, String>>,
    mut synced: watch::Receiver<bool>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *synced.borrow() {
            break;
        }
        tokio::select! {
            res = synced.changed() => {
                if res.is_err() {
                    return;
                }
            }
            _ = cancelled(&mut stop) => return,
        }
    }

    let mut ticker = tokio::time::interval(ANNOUNCE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for (pool, peers) in [(Pool::Lan, &peers_lan), (Pool::Wan, &peers_wan)] {
                    let addrs: Vec<String> =
                        peers.iter().map(|entry| entry.key().clone()).collect();
                    for addr in addrs {
                        match contact_peer(&node_name, &advertise, pool, &addr).await {
                            Ok(peer_name) => {
                                peers.insert(addr, peer_name);
                            }
                            Err(err) => {
                                tracing::debug!(peer = %addr, pool = %pool, error = %err, "Peer unreachable");
                            }
                        }
                    }
                }
            }
            _ = cancelled(&mut stop) => return,
        }
    }
}
