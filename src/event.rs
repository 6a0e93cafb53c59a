//! The event loop.
//!
//! Transport collaborators feed [`Event`]s through one channel; each event
//! runs to completion against the [`Matrix`] before the next is taken.
//! Pending module teardowns are polled alongside, so an asynchronous
//! unload never blocks event handling.

use crate::error::{LinkError, UserError};
use crate::state::{ClientReply, Matrix};
use crate::sync::LinkId;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use meshirc_proto::{CommandRecord, LinkMessage, UserUuid};
use std::future::Future;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Handle through which transport collaborators feed the core.
pub type EventSender = UnboundedSender<Event>;

/// Create the event channel. The sender is cloned into every listener and
/// link connector; the receiver goes to [`run`], which stops once every
/// sender is dropped.
pub fn channel() -> (EventSender, UnboundedReceiver<Event>) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Something that happened on a connection.
#[derive(Debug)]
pub enum Event {
    /// A client finished registration.
    UserConnected {
        nick: String,
        ident: String,
        host: String,
        realname: String,
        sender: UnboundedSender<ClientReply>,
        reply: oneshot::Sender<Result<UserUuid, UserError>>,
    },
    UserCommand {
        uuid: UserUuid,
        record: CommandRecord,
    },
    UserDisconnected {
        uuid: UserUuid,
        reason: String,
    },
    /// A server connection was accepted, or one we initiated is up.
    LinkOpened {
        sender: UnboundedSender<LinkMessage>,
        peer_addr: Option<String>,
        /// Link block name for outbound connections.
        connect_to: Option<String>,
        reply: oneshot::Sender<Result<LinkId, LinkError>>,
    },
    LinkMessage {
        link: LinkId,
        message: LinkMessage,
    },
    LinkClosed {
        link: LinkId,
    },
}

impl Matrix {
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::UserConnected {
                nick,
                ident,
                host,
                realname,
                sender,
                reply,
            } => {
                let result = self.connect_local_user(&nick, &ident, &host, &realname, sender);
                if let Err(e) = &result {
                    debug!(nick = %nick, error = %e, "Registration refused");
                }
                let _ = reply.send(result);
            }
            Event::UserCommand { uuid, record } => {
                if !self.users.contains_key(&uuid) {
                    debug!(uuid = %uuid, "Command from unknown user dropped");
                    return;
                }
                self.handle_user_command(&uuid, &record);
            }
            Event::UserDisconnected { uuid, reason } => {
                self.disconnect_user(&uuid, &reason);
            }
            Event::LinkOpened {
                sender,
                peer_addr,
                connect_to,
                reply,
            } => {
                let result = self.open_link(sender, peer_addr, connect_to.as_deref());
                if let Err(e) = &result {
                    warn!(error = %e, "Server link refused");
                }
                let _ = reply.send(result);
            }
            Event::LinkMessage { link, message } => self.handle_link_message(link, message),
            Event::LinkClosed { link } => self.close_link(link),
        }
    }
}

/// Run until the event channel closes or `shutdown` resolves, then unload
/// every module and wait for their teardowns.
pub async fn run(matrix: &mut Matrix, mut events: UnboundedReceiver<Event>, shutdown: impl Future<Output = ()>) {
    let mut teardowns = FuturesUnordered::new();
    tokio::pin!(shutdown);

    loop {
        teardowns.extend(matrix.take_teardowns());
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => matrix.handle_event(event),
                None => {
                    info!("Event channel closed");
                    break;
                }
            },
            Some(name) = teardowns.next(), if !teardowns.is_empty() => matrix.finish_unload(&name),
            () = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    matrix.shutdown();
    teardowns.extend(matrix.take_teardowns());
    while let Some(name) = teardowns.next().await {
        matrix.finish_unload(&name);
    }
    info!("Event loop stopped");
}
