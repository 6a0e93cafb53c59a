//! Server-to-server synchronization.
//!
//! Links servers into a spanning tree, replays full state to new peers and
//! prunes the tree when a link is lost. Transport is external: each link is
//! an unbounded channel of [`LinkMessage`]s going out, and inbound records
//! are fed to [`Matrix::handle_link_message`].
//!
//! - [`topology`]: the spanning tree and routing
//! - [`handshake`]: `Introduce` validation
//! - [`burst`]: initial state replay
//! - [`handler`]: applying records from a linked peer
//! - [`split`]: netsplit pruning

pub mod burst;
pub mod handler;
pub mod handshake;
pub mod split;
pub mod topology;

pub use topology::{ServerNode, TopologyGraph};

use crate::error::LinkError;
use crate::metrics;
use crate::state::Matrix;
use meshirc_proto::{LinkMessage, ServerId};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Identifies one server connection, handshaken or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Which direct neighbors a change is relayed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagate {
    All,
    /// Everyone but the link the change arrived on.
    Except(LinkId),
    Nowhere,
}

impl Propagate {
    pub fn except(link: Option<LinkId>) -> Self {
        link.map_or(Self::All, Self::Except)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// We connected out and sent our `Introduce`.
    OutboundInitiated,
    /// The peer connected to us; waiting for its `Introduce`.
    InboundReceived,
    /// Handshake accepted, state replay in progress.
    Bursting,
    /// The peer's burst has completed.
    Synced,
}

impl HandshakeState {
    pub fn is_established(self) -> bool {
        matches!(self, Self::Bursting | Self::Synced)
    }
}

/// A direct connection to another server.
#[derive(Debug)]
pub struct PeerLink {
    tx: UnboundedSender<LinkMessage>,
    pub state: HandshakeState,
    /// Set once the handshake is accepted.
    pub remote: Option<ServerId>,
    /// We initiated the outbound connection. Breaks creation-time ties.
    pub local_origin: bool,
    pub peer_addr: Option<String>,
    pub(crate) sent_introduce: bool,
    /// Channels created on our side by this peer's burst.
    pub burst_created: HashSet<String>,
    /// Channels whose conflict the peer lost; its burst modes and topic for
    /// them are discarded.
    pub burst_lost: HashSet<String>,
}

impl PeerLink {
    pub fn send(&self, message: LinkMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Links and topology owned by the server context.
#[derive(Debug)]
pub struct SyncManager {
    pub local_id: ServerId,
    pub topology: TopologyGraph,
    links: BTreeMap<LinkId, PeerLink>,
    next_link: u64,
}

impl SyncManager {
    pub fn new(local_id: ServerId) -> Self {
        Self {
            topology: TopologyGraph::new(local_id.clone()),
            local_id,
            links: BTreeMap::new(),
            next_link: 0,
        }
    }

    pub fn server_name(&self, sid: &ServerId) -> Option<&str> {
        self.topology.get(sid).map(|n| n.name.as_str())
    }

    pub fn link(&self, id: LinkId) -> Option<&PeerLink> {
        self.links.get(&id)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut PeerLink> {
        self.links.get_mut(&id)
    }

    /// The link a server is reached over.
    pub fn link_for(&self, sid: &ServerId) -> Option<LinkId> {
        self.topology.get(sid).map(|n| n.link)
    }

    /// Handshaken direct neighbors.
    pub fn peers(&self) -> impl Iterator<Item = (LinkId, &PeerLink)> {
        self.links
            .iter()
            .filter(|(_, l)| l.state.is_established())
            .map(|(id, l)| (*id, l))
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn insert(&mut self, link: PeerLink) -> LinkId {
        self.next_link += 1;
        let id = LinkId(self.next_link);
        self.links.insert(id, link);
        id
    }

    fn remove(&mut self, id: LinkId) -> Option<PeerLink> {
        self.links.remove(&id)
    }

    fn publish_peer_count(&self) {
        metrics::set_peers_connected(self.peers().count());
    }
}

impl Matrix {
    /// Register a new server connection.
    ///
    /// For an outbound connection (`connect_to` set) our `Introduce` goes
    /// out immediately; the name must have a link block.
    pub fn open_link(
        &mut self,
        tx: UnboundedSender<LinkMessage>,
        peer_addr: Option<String>,
        connect_to: Option<&str>,
    ) -> Result<LinkId, LinkError> {
        let outbound = match connect_to {
            Some(name) => Some(
                self.links
                    .iter()
                    .find(|l| l.name == name)
                    .cloned()
                    .ok_or_else(|| LinkError::NoLinkConfigured(name.to_string()))?,
            ),
            None => None,
        };
        let link = PeerLink {
            tx,
            state: if outbound.is_some() {
                HandshakeState::OutboundInitiated
            } else {
                HandshakeState::InboundReceived
            },
            remote: None,
            local_origin: outbound.is_some(),
            peer_addr,
            sent_introduce: false,
            burst_created: HashSet::new(),
            burst_lost: HashSet::new(),
        };
        let id = self.sync.insert(link);
        if let Some(block) = outbound {
            info!(link = %id, peer = %block.name, "Initiating server link");
            self.send_introduce(id, &block.outgoing_password);
        } else {
            debug!(link = %id, "Inbound server connection");
        }
        Ok(id)
    }

    /// Forget a connection. A handshaken peer splits off with everything
    /// behind it.
    pub fn close_link(&mut self, id: LinkId) {
        let Some(link) = self.sync.remove(id) else {
            return;
        };
        if let Some(sid) = link.remote
            && self.sync.topology.get(&sid).is_some_and(|n| n.link == id)
        {
            self.netsplit(&sid, None);
        }
        self.sync.publish_peer_count();
    }

    /// Send to one connection regardless of handshake state.
    pub(crate) fn send_on_link(&self, id: LinkId, message: LinkMessage) {
        if let Some(link) = self.sync.link(id)
            && !link.send(message)
        {
            debug!(link = %id, "link channel closed");
        }
    }

    /// Relay a record to handshaken neighbors.
    pub fn broadcast(&self, propagate: Propagate, message: LinkMessage) {
        let except = match propagate {
            Propagate::Nowhere => return,
            Propagate::All => None,
            Propagate::Except(id) => Some(id),
        };
        for (id, link) in self.sync.peers() {
            if Some(id) != except && !link.send(message.clone()) {
                debug!(link = %id, "link channel closed");
            }
        }
    }

    /// The direct neighbor toward a server.
    pub fn route(&self, target: &ServerId) -> Option<ServerId> {
        self.sync.topology.get_route(target)
    }

    /// Send a record toward one server.
    pub fn send_to_server(&self, target: &ServerId, message: LinkMessage) -> bool {
        let Some(link) = self.route(target).and_then(|hop| self.sync.link_for(&hop)) else {
            return false;
        };
        self.sync.link(link).is_some_and(|l| l.send(message))
    }
}
