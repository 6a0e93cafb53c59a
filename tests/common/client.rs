//! A locally connected test user.

use meshirc_proto::{CommandRecord, UserUuid};
use meshircd::state::{ClientReply, Matrix};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

/// A user connected to one [`Matrix`], with its reply queue.
pub struct TestClient {
    pub uuid: UserUuid,
    rx: UnboundedReceiver<ClientReply>,
}

impl TestClient {
    /// Register a user and discard the welcome replies.
    pub fn connect(matrix: &mut Matrix, nick: &str) -> Self {
        let (tx, rx) = unbounded_channel();
        let uuid = matrix
            .connect_local_user(nick, nick, "client.test", nick, tx)
            .expect("user registers");
        let mut client = Self { uuid, rx };
        client.drain();
        client
    }

    /// Send a command line through the user command tables.
    pub fn send(&self, matrix: &mut Matrix, command: &str, params: &[&str]) -> bool {
        let record = CommandRecord::new(command, params.iter().map(|p| p.to_string()).collect());
        matrix.handle_user_command(&self.uuid, &record)
    }

    /// Everything received so far.
    pub fn drain(&mut self) -> Vec<ClientReply> {
        let mut replies = Vec::new();
        while let Ok(reply) = self.rx.try_recv() {
            replies.push(reply);
        }
        replies
    }

    /// Numeric codes received so far, in order.
    pub fn numerics(&mut self) -> Vec<u16> {
        self.drain().iter().filter_map(ClientReply::code).collect()
    }

    /// Parameters of every event with the given command received so far.
    pub fn events(&mut self, command: &str) -> Vec<Vec<String>> {
        self.drain()
            .into_iter()
            .filter_map(|reply| match reply {
                ClientReply::Event {
                    command: c, params, ..
                } if c == command => Some(params),
                _ => None,
            })
            .collect()
    }
}
