//! Helpers shared by the crate's unit tests.

use partyhall_protocol::{GameConfig, GameType, PlayerId, RoomId};
use tokio::sync::mpsc;

use crate::config::RoomSettings;
use crate::game::GameRoom;
use crate::message::ServerMessage;
use crate::random::ScriptedRandomness;
use crate::session::{ClientHandle, Outbound, RoomSession};

pub(crate) type Inbox = mpsc::UnboundedReceiver<Outbound>;

pub(crate) fn client(id: u64) -> (ClientHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ClientHandle::new(PlayerId(id), tx), rx)
}

/// Every event received so far, oldest first.
pub(crate) fn drain(inbox: &mut Inbox) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(out) = inbox.try_recv() {
        if let Outbound::Message(message) = out {
            messages.push((*message).clone());
        }
    }
    messages
}

/// Was a close requested on this connection?
pub(crate) fn closed(inbox: &mut Inbox) -> bool {
    let mut close = false;
    while let Ok(out) = inbox.try_recv() {
        close |= matches!(out, Outbound::Close);
    }
    close
}

pub(crate) fn errors(messages: &[ServerMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub(crate) fn new_room<G: GameRoom>(
    game_type: GameType,
    config: GameConfig,
    rng: ScriptedRandomness,
) -> G {
    let session = RoomSession::new(
        RoomId::new(4242).unwrap(),
        RoomSettings::resolve(game_type, &config),
        Box::new(rng),
    );
    G::create(session)
}

/// Seats one player per name; player ids are 1, 2, 3, ...
pub(crate) fn seat_all<G: GameRoom>(room: &mut G, names: &[&str]) -> Vec<Inbox> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let (handle, inbox) = client(i as u64 + 1);
            room.add_player(handle, (*name).to_string()).unwrap();
            inbox
        })
        .collect()
}

pub(crate) fn drain_all(inboxes: &mut [Inbox]) {
    for inbox in inboxes {
        drain(inbox);
    }
}

pub(crate) fn pid(n: u64) -> PlayerId {
    PlayerId(n)
}
