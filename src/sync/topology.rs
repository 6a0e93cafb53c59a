//! Network topology tracking.
//!
//! Every known remote server points one hop toward the local node
//! (`next_closest`), forming a spanning tree rooted here. Routing follows
//! those pointers; netsplit cleanup walks them in reverse.

use super::LinkId;
use meshirc_proto::{ServerId, ServerName};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// A remote server in the mesh.
#[derive(Debug, Clone)]
pub struct ServerNode {
    pub id: ServerId,
    pub name: ServerName,
    pub description: String,
    /// Hops from the local server; direct neighbors are 1.
    pub hop_count: u32,
    /// The server one hop toward us. The local ID for direct neighbors.
    pub next_closest: ServerId,
    /// Link the server is reached over.
    pub link: LinkId,
    /// Whether its burst has been fully received.
    pub bursted: bool,
}

/// The spanning tree of remote servers. The local server is the implicit
/// root and has no entry.
#[derive(Debug, Clone)]
pub struct TopologyGraph {
    local: ServerId,
    servers: BTreeMap<ServerId, ServerNode>,
}

impl TopologyGraph {
    pub fn new(local: ServerId) -> Self {
        Self {
            local,
            servers: BTreeMap::new(),
        }
    }

    pub fn add_server(&mut self, node: ServerNode) {
        self.servers.insert(node.id.clone(), node);
    }

    pub fn get(&self, sid: &ServerId) -> Option<&ServerNode> {
        self.servers.get(sid)
    }

    pub fn get_mut(&mut self, sid: &ServerId) -> Option<&mut ServerNode> {
        self.servers.get_mut(sid)
    }

    pub fn contains(&self, sid: &ServerId) -> bool {
        self.servers.contains_key(sid)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ServerNode> {
        self.servers
            .values()
            .find(|n| n.name.as_str().eq_ignore_ascii_case(name))
    }

    /// The direct neighbor a message for `target` must be handed to.
    pub fn get_route(&self, target: &ServerId) -> Option<ServerId> {
        let mut current = self.servers.get(target)?;
        let mut hops = 0;
        while current.next_closest != self.local {
            current = self.servers.get(&current.next_closest)?;
            hops += 1;
            if hops > self.servers.len() {
                return None;
            }
        }
        Some(current.id.clone())
    }

    /// The target and every server whose path to us runs through it,
    /// parents before children.
    pub fn get_downstream_sids(&self, target: &ServerId) -> Vec<ServerId> {
        if !self.servers.contains_key(target) {
            return Vec::new();
        }
        let mut result = Vec::new();
        let mut queue = VecDeque::from([target.clone()]);
        let mut processed = HashSet::new();

        while let Some(current) = queue.pop_front() {
            if !processed.insert(current.clone()) {
                continue;
            }
            result.push(current.clone());
            for node in self.servers.values() {
                if node.next_closest == current && !processed.contains(&node.id) {
                    queue.push_back(node.id.clone());
                }
            }
        }
        result
    }

    /// Every server in breadth-first order from the root, so each node's
    /// `next_closest` precedes it.
    pub fn bfs_order(&self) -> Vec<&ServerNode> {
        let mut out = Vec::with_capacity(self.servers.len());
        let mut frontier = vec![self.local.clone()];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for parent in &frontier {
                for node in self.servers.values().filter(|n| &n.next_closest == parent) {
                    out.push(node);
                    next.push(node.id.clone());
                }
            }
            frontier = next;
        }
        out
    }

    pub fn remove_servers(&mut self, sids: &[ServerId]) {
        for sid in sids {
            self.servers.remove(sid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> ServerId {
        ServerId::parse(s).unwrap()
    }

    fn node(id: &str, parent: &str, hops: u32) -> ServerNode {
        ServerNode {
            id: sid(id),
            name: ServerName::parse(&format!("{}.example.net", id.to_lowercase())).unwrap(),
            description: String::new(),
            hop_count: hops,
            next_closest: sid(parent),
            link: LinkId(1),
            bursted: true,
        }
    }

    #[test]
    fn test_downstream_sids_linear() {
        // 001 -> 00A -> 00B -> 00C
        let mut graph = TopologyGraph::new(sid("001"));
        graph.add_server(node("00A", "001", 1));
        graph.add_server(node("00B", "00A", 2));
        graph.add_server(node("00C", "00B", 3));

        let downstream = graph.get_downstream_sids(&sid("00A"));
        assert_eq!(downstream, vec![sid("00A"), sid("00B"), sid("00C")]);
        assert_eq!(graph.get_downstream_sids(&sid("00C")), vec![sid("00C")]);
    }

    #[test]
    fn test_downstream_sids_tree() {
        // 001 -> 00A -> {00B, 00C}, 001 -> 00D
        let mut graph = TopologyGraph::new(sid("001"));
        graph.add_server(node("00A", "001", 1));
        graph.add_server(node("00B", "00A", 2));
        graph.add_server(node("00C", "00A", 2));
        graph.add_server(node("00D", "001", 1));

        let downstream = graph.get_downstream_sids(&sid("00A"));
        assert_eq!(downstream.len(), 3);
        assert!(!downstream.contains(&sid("00D")));
        assert!(graph.get_downstream_sids(&sid("00Z")).is_empty());
    }

    #[test]
    fn test_route_follows_next_closest() {
        let mut graph = TopologyGraph::new(sid("001"));
        graph.add_server(node("00A", "001", 1));
        graph.add_server(node("00B", "00A", 2));
        graph.add_server(node("00C", "00B", 3));
        assert_eq!(graph.get_route(&sid("00C")), Some(sid("00A")));
        assert_eq!(graph.get_route(&sid("00A")), Some(sid("00A")));
        assert_eq!(graph.get_route(&sid("00Q")), None);
    }

    #[test]
    fn test_bfs_order_parents_first() {
        let mut graph = TopologyGraph::new(sid("001"));
        graph.add_server(node("00C", "00B", 3));
        graph.add_server(node("00B", "00A", 2));
        graph.add_server(node("00A", "001", 1));
        let order: Vec<&str> = graph.bfs_order().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["00A", "00B", "00C"]);
    }
}
