//! Link handshake.
//!
//! Both sides send one `Introduce`. The responder validates the
//! initiator's and answers with its own; the initiator validates the
//! answer. Any mismatch is fatal to this connection only, and nothing is
//! recorded about the peer until validation has passed.

use super::topology::ServerNode;
use super::{HandshakeState, LinkId, Propagate};
use crate::error::LinkError;
use crate::state::Matrix;
use meshirc_proto::{LinkMessage, PROTOCOL_VERSION, ServerId, ServerName, is_compatible};
use std::collections::BTreeSet;
use tracing::info;

/// The peer's `Introduce` fields.
#[derive(Debug, Clone)]
pub struct Introduction {
    pub name: String,
    pub password: String,
    pub description: String,
    pub protocol_version: u32,
    pub common_modules: BTreeSet<String>,
    pub sid: ServerId,
}

impl Matrix {
    pub(crate) fn send_introduce(&mut self, id: LinkId, password: &str) {
        let message = LinkMessage::Introduce {
            name: self.server.name.as_str().to_string(),
            password: password.to_string(),
            description: self.server.description.clone(),
            protocol_version: PROTOCOL_VERSION,
            common_modules: self.registry.common_modules(),
            sid: self.server.id.clone(),
        };
        self.send_on_link(id, message);
        if let Some(link) = self.sync.link_mut(id) {
            link.sent_introduce = true;
        }
    }

    /// Check a peer's introduction against our state and link blocks.
    fn validate_introduction(&self, id: LinkId, intro: &Introduction) -> Result<ServerName, LinkError> {
        let Some(link) = self.sync.link(id) else {
            return Err(LinkError::HandshakeNotComplete);
        };
        if link.state.is_established() {
            return Err(LinkError::HandshakeAlreadyComplete);
        }
        if !is_compatible(intro.protocol_version) {
            return Err(LinkError::IncompatibleVersion(intro.protocol_version));
        }
        let ours = self.registry.common_modules();
        if ours != intro.common_modules {
            let diff: Vec<String> = ours
                .symmetric_difference(&intro.common_modules)
                .cloned()
                .collect();
            return Err(LinkError::ModuleMismatch(diff));
        }
        let Some(block) = self.links.iter().find(|l| l.name == intro.name) else {
            return Err(LinkError::NoLinkConfigured(intro.name.clone()));
        };
        let name = ServerName::parse(&intro.name)
            .map_err(|_| LinkError::NoLinkConfigured(intro.name.clone()))?;
        if intro.sid == self.server.id
            || self.sync.topology.contains(&intro.sid)
            || intro.name.eq_ignore_ascii_case(self.server.name.as_str())
            || self.sync.topology.find_by_name(&intro.name).is_some()
        {
            return Err(LinkError::ServerAlreadyConnected(intro.name.clone()));
        }
        if !link.local_origin
            && let Some(expected) = &block.address
            && link.peer_addr.as_deref() != Some(expected.as_str())
        {
            return Err(LinkError::MismatchedAddress {
                name: intro.name.clone(),
                address: link.peer_addr.clone().unwrap_or_default(),
            });
        }
        if intro.password != block.incoming_password {
            return Err(LinkError::BadPassword(intro.name.clone()));
        }
        Ok(name)
    }

    /// Accept or reject a peer's `Introduce`. On success the peer joins the
    /// topology, is announced to the rest of the mesh and receives our burst.
    pub(crate) fn handle_introduce(&mut self, id: LinkId, intro: Introduction) -> Result<(), LinkError> {
        let name = self.validate_introduction(id, &intro)?;

        let needs_reply = self.sync.link(id).is_some_and(|l| !l.sent_introduce);
        if needs_reply {
            let password = self
                .links
                .iter()
                .find(|l| l.name == intro.name)
                .map(|l| l.outgoing_password.clone())
                .unwrap_or_default();
            self.send_introduce(id, &password);
        }

        if let Some(link) = self.sync.link_mut(id) {
            link.state = HandshakeState::Bursting;
            link.remote = Some(intro.sid.clone());
        }
        self.sync.topology.add_server(ServerNode {
            id: intro.sid.clone(),
            name,
            description: intro.description.clone(),
            hop_count: 1,
            next_closest: self.server.id.clone(),
            link: id,
            bursted: false,
        });
        self.sync.publish_peer_count();
        info!(link = %id, sid = %intro.sid, name = %intro.name, "Server link accepted");

        self.broadcast(
            Propagate::Except(id),
            LinkMessage::AddServer {
                sid: intro.sid,
                name: intro.name,
                description: intro.description,
                hop_count: 2,
                near_hop: self.server.id.clone(),
            },
        );
        self.send_burst(id);
        Ok(())
    }
}
