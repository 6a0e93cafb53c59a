//! Netsplit handling.
//!
//! When a server drops, everything whose path to us ran through it goes
//! too: the servers, their users and, through the users, any channel left
//! empty. The loss is relayed once to every other direct neighbor, each of
//! which repeats the same local computation.

use super::{LinkId, Propagate};
use crate::metrics;
use crate::modules::{Arg, Targets};
use crate::state::Matrix;
use meshirc_proto::{LinkMessage, ServerId, UserUuid};
use tracing::{debug, info};

/// Quit reason shown for users lost in a split: the two servers on either
/// side of the broken edge.
pub fn netsplit_reason(near_name: &str, lost_name: &str) -> String {
    format!("{near_name} {lost_name}")
}

impl Matrix {
    /// Prune a server and its subtree. `detected_on` is the link the loss
    /// was reported on, which is not told about it again.
    pub fn netsplit(&mut self, sid: &ServerId, detected_on: Option<LinkId>) {
        let affected = self.sync.topology.get_downstream_sids(sid);
        if affected.is_empty() {
            debug!(sid = %sid, "No servers affected by netsplit");
            return;
        }
        let Some(node) = self.sync.topology.get(sid) else {
            return;
        };
        let lost_name = node.name.as_str().to_string();
        let near_name = if node.next_closest == self.server.id {
            self.server.name.as_str().to_string()
        } else {
            self.sync
                .server_name(&node.next_closest)
                .unwrap_or(node.next_closest.as_str())
                .to_string()
        };
        let direct_link = (node.next_closest == self.server.id).then_some(node.link);
        info!(
            sid = %sid,
            affected = affected.len(),
            "Netsplit detected, pruning subtree"
        );

        let mut lost_users: Vec<UserUuid> = self
            .users
            .values()
            .filter(|u| affected.contains(&u.server))
            .map(|u| u.uuid.clone())
            .collect();
        lost_users.sort();
        let reason = netsplit_reason(&near_name, &lost_name);
        for uuid in &lost_users {
            self.remove_user(uuid, &reason, Propagate::Nowhere);
        }

        self.sync.topology.remove_servers(&affected);
        if let Some(link) = direct_link {
            self.sync.remove(link);
        }

        self.broadcast(
            Propagate::except(detected_on),
            LinkMessage::ServerDisconnected { sid: sid.clone() },
        );
        self.run_action_standard(
            "netsplit",
            &[Arg::Server(sid.clone()), Arg::Servers(affected.clone())],
            &Targets::none(),
        );

        metrics::record_netsplit(lost_users.len());
        self.sync.publish_peer_count();
        info!(
            sid = %sid,
            users_removed = lost_users.len(),
            servers_removed = affected.len(),
            "Netsplit cleanup complete"
        );
    }
}
