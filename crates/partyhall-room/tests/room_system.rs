//! Integration tests for the room actor and registry.
//!
//! Every test runs on paused Tokio time: awaiting a message whose timer
//! is pending jumps the clock straight to that timer.

use std::time::Duration;

use partyhall_protocol::{GameConfig, GameType, PlayerId, RoomId};
use partyhall_room::{
    ClientHandle, GameAction, GameOverReason, GameView, Outbound, RegistryConfig, RoomError,
    RoomHandle, RoomRegistry, ScriptedRandomness, ServerMessage,
};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

type Inbox = mpsc::UnboundedReceiver<Outbound>;

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn client(id: u64) -> (ClientHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ClientHandle::new(pid(id), tx), rx)
}

fn registry() -> (RoomRegistry, mpsc::UnboundedReceiver<RoomId>) {
    RoomRegistry::with_randomness(
        RegistryConfig::default(),
        Box::new(ScriptedRandomness::new()),
    )
}

/// Everything already delivered, without waiting.
fn drain(inbox: &mut Inbox) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(out) = inbox.try_recv() {
        if let Outbound::Message(message) = out {
            messages.push((*message).clone());
        }
    }
    messages
}

/// Waits for the first event matching `predicate`, skipping the rest.
async fn wait_for(inbox: &mut Inbox, predicate: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
    loop {
        match inbox.recv().await {
            Some(Outbound::Message(message)) if predicate(&message) => {
                return (*message).clone();
            }
            Some(_) => {}
            None => panic!("connection channel closed"),
        }
    }
}

async fn seat(handle: &RoomHandle, id: u64, name: &str) -> Inbox {
    let (client, inbox) = client(id);
    handle.join(client, name.to_string()).await.unwrap();
    inbox
}

// =========================================================================
// Registry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_registry_create_unknown_game_type_fails() {
    let (mut rooms, _dissolved) = registry();
    let err = rooms.create("chess", &GameConfig::default()).unwrap_err();
    assert_eq!(err, RoomError::InvalidGameType("chess".into()));
    assert!(rooms.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_registry_create_assigns_free_four_digit_ids() {
    let (mut rooms, _dissolved) = registry();
    let first = rooms.create("number-duel", &GameConfig::default()).unwrap();
    let second = rooms.create("bluff-card", &GameConfig::default()).unwrap();

    assert_ne!(first.room_id(), second.room_id());
    for handle in [&first, &second] {
        assert!((1000..=9999).contains(&handle.room_id().get()));
    }
    assert_eq!(second.game_type(), GameType::BluffCard);
    assert_eq!(rooms.len(), 2);
    assert!(rooms.get(first.room_id()).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_registry_create_at_taken_id_fails() {
    let (mut rooms, _dissolved) = registry();
    let id = RoomId::new(4242).unwrap();
    rooms
        .create_at(id, GameType::SpeedMatch, &GameConfig::default())
        .unwrap();

    let err = rooms
        .create_at(id, GameType::HiddenCount, &GameConfig::default())
        .unwrap_err();
    assert_eq!(err, RoomError::AlreadyExists(id));
}

#[tokio::test(start_paused = true)]
async fn test_registry_evict_is_idempotent() {
    let (mut rooms, _dissolved) = registry();
    let handle = rooms.create("board-capture", &GameConfig::default()).unwrap();
    let id = handle.room_id();

    assert!(rooms.evict(id));
    assert!(!rooms.evict(id));
    assert!(rooms.get(id).is_none());
    assert_eq!(handle.info().await.unwrap_err(), RoomError::Unavailable(id));
}

#[tokio::test(start_paused = true)]
async fn test_registry_sweep_evicts_only_idle_empty_rooms() {
    let (mut rooms, _dissolved) = registry();
    let empty = rooms.create("speed-match", &GameConfig::default()).unwrap();
    let busy = rooms.create("speed-match", &GameConfig::default()).unwrap();
    let _inbox = seat(&busy, 1, "ana").await;

    assert!(rooms.sweep().await.is_empty());

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(rooms.sweep().await, vec![empty.room_id()]);
    assert!(rooms.get(busy.room_id()).is_some());
    assert_eq!(rooms.len(), 1);
}

// =========================================================================
// Actor lifecycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_room_join_reports_seat_and_info() {
    let (mut rooms, _dissolved) = registry();
    let handle = rooms.create("hidden-count", &GameConfig::default()).unwrap();

    let mut ana = seat(&handle, 1, "ana").await;
    let mut ben = seat(&handle, 2, "ben").await;

    let joined = drain(&mut ana);
    assert!(matches!(
        joined.first(),
        Some(ServerMessage::RoomJoined { player_index: 0, .. })
    ));
    assert!(drain(&mut ben).contains(&ServerMessage::PlayerJoined {
        player_index: 0,
        player_name: "ana".into(),
    }));

    let info = handle.info().await.unwrap();
    assert_eq!(info.player_count, 2);
    assert_eq!(info.max_players, 6);
    assert_eq!(info.state, "WAITING");
}

#[tokio::test(start_paused = true)]
async fn test_room_setup_timeout_dissolves_and_notifies_registry() {
    let (mut rooms, mut dissolved) = registry();
    let handle = rooms.create("number-duel", &GameConfig::default()).unwrap();
    let mut ana = seat(&handle, 1, "ana").await;
    let _ben = seat(&handle, 2, "ben").await;

    let notice = wait_for(&mut ana, |m| matches!(m, ServerMessage::RoomDissolved { .. })).await;
    assert!(matches!(notice, ServerMessage::RoomDissolved { redirect: true, .. }));
    assert_eq!(dissolved.recv().await, Some(handle.room_id()));
    assert!(rooms.evict(handle.room_id()));
}

#[tokio::test(start_paused = true)]
async fn test_room_spectator_receives_snapshot_and_count() {
    let (mut rooms, _dissolved) = registry();
    let handle = rooms.create("board-capture", &GameConfig::default()).unwrap();
    let mut ana = seat(&handle, 1, "ana").await;
    drain(&mut ana);

    let (watcher, mut watching) = client(9);
    handle.spectate(watcher).await.unwrap();

    let seen = drain(&mut watching);
    let Some(ServerMessage::SpectateJoined(snapshot)) = seen.first() else {
        panic!("expected a snapshot first, got {seen:?}");
    };
    assert_eq!(snapshot.game_type, GameType::BoardCapture);
    assert!(matches!(snapshot.game, GameView::BoardCapture { .. }));
    assert!(drain(&mut ana).contains(&ServerMessage::SpectatorCount { count: 1 }));

    handle.unspectate(pid(9)).await.unwrap();
    assert_eq!(handle.info().await.unwrap().spectator_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_room_kick_bans_name() {
    let (mut rooms, _dissolved) = registry();
    let handle = rooms.create("bluff-card", &GameConfig::default()).unwrap();
    let _ana = seat(&handle, 1, "ana").await;
    let _ben = seat(&handle, 2, "ben").await;
    let mut cy = seat(&handle, 3, "cy").await;

    assert_eq!(handle.kick(pid(2), 2).await, Err(RoomError::NotHost));
    assert_eq!(handle.kick(pid(1), 0).await, Err(RoomError::InvalidTarget(0)));
    handle.kick(pid(1), 2).await.unwrap();
    assert!(drain(&mut cy).iter().any(|m| matches!(m, ServerMessage::Kicked { .. })));

    let (again, _inbox) = client(4);
    assert_eq!(
        handle.join(again, "cy".into()).await,
        Err(RoomError::Banned("cy".into()))
    );
    assert_eq!(handle.info().await.unwrap().player_count, 2);
}

/// Seats two players in a board game and runs until the first turn.
async fn board_in_play(rooms: &mut RoomRegistry) -> (RoomHandle, Inbox, Inbox) {
    let handle = rooms.create("board-capture", &GameConfig::default()).unwrap();
    let mut ana = seat(&handle, 1, "ana").await;
    let ben = seat(&handle, 2, "ben").await;
    handle.action(pid(1), GameAction::StartGame).await.unwrap();
    wait_for(&mut ana, |m| matches!(m, ServerMessage::TurnStart { .. })).await;
    (handle, ana, ben)
}

#[tokio::test(start_paused = true)]
async fn test_room_disconnect_grace_expiry_forfeits() {
    let (mut rooms, _dissolved) = registry();
    let (handle, mut ana, _ben) = board_in_play(&mut rooms).await;

    handle.disconnect(pid(2)).await.unwrap();
    wait_for(&mut ana, |m| matches!(m, ServerMessage::PlayerAway { player_index: 1, .. })).await;

    let over = wait_for(&mut ana, |m| matches!(m, ServerMessage::GameOver(_))).await;
    let ServerMessage::GameOver(over) = over else {
        unreachable!();
    };
    assert_eq!(over.reason, GameOverReason::Disconnect);
    assert_eq!(over.winner, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_room_reconnect_by_name_restores_seat() {
    let (mut rooms, _dissolved) = registry();
    let (handle, mut ana, mut old_ben) = board_in_play(&mut rooms).await;

    // A live seat is never handed over.
    let (thief, _thief_inbox) = client(5);
    assert_eq!(
        handle.reconnect(thief, "ben".into()).await,
        Err(RoomError::NoSuchPlayer("ben".into()))
    );

    handle.disconnect(pid(2)).await.unwrap();
    let (ben, mut new_ben) = client(3);
    assert_eq!(handle.reconnect(ben, "ben".into()).await, Ok(1));

    let seen = drain(&mut new_ben);
    let Some(ServerMessage::Reconnected {
        player_index,
        snapshot,
        ..
    }) = seen.first()
    else {
        panic!("expected a reconnect snapshot, got {seen:?}");
    };
    assert_eq!(*player_index, 1);
    assert_eq!(snapshot.state, "PLAYING");
    assert!(drain(&mut ana).contains(&ServerMessage::PlayerBack {
        player_index: 1,
        player_name: "ben".into(),
    }));

    let mut closed = false;
    while let Ok(out) = old_ben.try_recv() {
        closed |= matches!(out, Outbound::Close);
    }
    assert!(closed);
}

#[tokio::test(start_paused = true)]
async fn test_room_leave_resolves_after_removal() {
    let (mut rooms, _dissolved) = registry();
    let handle = rooms.create("speed-match", &GameConfig::default()).unwrap();
    let _ana = seat(&handle, 1, "ana").await;

    handle.leave(pid(1)).await.unwrap();
    assert!(handle.info().await.unwrap().is_empty());
}
