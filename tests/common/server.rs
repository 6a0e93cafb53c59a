//! In-process test servers and the wiring between them.

use meshirc_proto::LinkMessage;
use meshircd::config::Config;
use meshircd::state::{Matrix, MemoryStorage};
use meshircd::sync::LinkId;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

/// Shared secret used by every generated link block.
pub const LINK_PASSWORD: &str = "s3cret";

/// Configuration text for a server that may link with `peers`.
pub fn config_for(name: &str, sid: &str, modules: &[&str], peers: &[&str]) -> String {
    let modules = modules
        .iter()
        .map(|m| format!("\"{m}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let mut text = format!(
        r#"
[server]
name = "{name}"
sid = "{sid}"
description = "Test server {sid}"

[modules]
load = [{modules}]
"#
    );
    for peer in peers {
        text.push_str(&format!(
            r#"
[[links]]
name = "{peer}"
incoming_password = "{LINK_PASSWORD}"
outgoing_password = "{LINK_PASSWORD}"
"#
        ));
    }
    text
}

/// One server of a test network.
pub struct TestServer {
    pub name: String,
    pub matrix: Matrix,
}

impl TestServer {
    pub fn new(name: &str, sid: &str, modules: &[&str], peers: &[&str]) -> Self {
        let config = Config::parse(&config_for(name, sid, modules, peers)).expect("test config parses");
        let matrix = Matrix::new(&config, Box::new(MemoryStorage::default())).expect("server starts");
        Self {
            name: name.to_string(),
            matrix,
        }
    }
}

/// A bidirectional in-memory link between two servers.
struct Wire {
    a: usize,
    a_link: LinkId,
    /// Records `a` sent toward `b`.
    a_out: UnboundedReceiver<LinkMessage>,
    b: usize,
    b_link: LinkId,
    b_out: UnboundedReceiver<LinkMessage>,
}

/// A set of servers and the wires between them.
#[derive(Default)]
pub struct TestNet {
    pub servers: Vec<TestServer>,
    wires: Vec<Wire>,
}

impl TestNet {
    /// Servers that all carry link blocks for each other.
    pub fn new(specs: &[(&str, &str)], modules: &[&str]) -> Self {
        let names: Vec<&str> = specs.iter().map(|(name, _)| *name).collect();
        let servers = specs
            .iter()
            .map(|(name, sid)| {
                let peers: Vec<&str> = names.iter().copied().filter(|n| n != name).collect();
                TestServer::new(name, sid, modules, &peers)
            })
            .collect();
        Self {
            servers,
            wires: Vec::new(),
        }
    }

    pub fn add(&mut self, server: TestServer) -> usize {
        self.servers.push(server);
        self.servers.len() - 1
    }

    pub fn matrix(&mut self, idx: usize) -> &mut Matrix {
        &mut self.servers[idx].matrix
    }

    /// Open a link from `a` (initiator) to `b` and run it to quiescence.
    /// Returns the wire index.
    pub fn link(&mut self, a: usize, b: usize) -> usize {
        let b_name = self.servers[b].name.clone();
        let (a_tx, a_out) = unbounded_channel();
        let (b_tx, b_out) = unbounded_channel();
        let b_link = self.servers[b]
            .matrix
            .open_link(b_tx, Some("127.0.0.1".into()), None)
            .expect("inbound link opens");
        let a_link = self.servers[a]
            .matrix
            .open_link(a_tx, None, Some(&b_name))
            .expect("outbound link opens");
        self.wires.push(Wire {
            a,
            a_link,
            a_out,
            b,
            b_link,
            b_out,
        });
        self.pump();
        self.wires.len() - 1
    }

    /// Deliver queued records until every wire is idle.
    pub fn pump(&mut self) {
        loop {
            let mut delivered = false;
            for wire in &mut self.wires {
                while let Ok(msg) = wire.a_out.try_recv() {
                    self.servers[wire.b].matrix.handle_link_message(wire.b_link, msg);
                    delivered = true;
                }
                while let Ok(msg) = wire.b_out.try_recv() {
                    self.servers[wire.a].matrix.handle_link_message(wire.a_link, msg);
                    delivered = true;
                }
            }
            if !delivered {
                break;
            }
        }
    }

    /// Cut a wire: both ends notice the connection loss.
    pub fn cut(&mut self, wire: usize) {
        let wire = self.wires.remove(wire);
        self.servers[wire.a].matrix.close_link(wire.a_link);
        self.servers[wire.b].matrix.close_link(wire.b_link);
        self.pump();
    }

    /// Link ids of a wire as seen by its initiator and by its acceptor.
    pub fn link_ids(&self, wire: usize) -> (LinkId, LinkId) {
        let w = &self.wires[wire];
        (w.a_link, w.b_link)
    }

    /// Whether the wire's link is still registered on both ends.
    pub fn is_up(&self, wire: usize) -> bool {
        self.wires.get(wire).is_some_and(|w| {
            self.servers[w.a].matrix.sync.link(w.a_link).is_some()
                && self.servers[w.b].matrix.sync.link(w.b_link).is_some()
        })
    }
}
