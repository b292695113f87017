//! Integration tests for the Partyhall server, handler, and full connection flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use partyhall::prelude::*;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Dice and reveal pauses short enough for a test to sit through.
fn fast_timing() -> Timing {
    Timing {
        dice_delay: Duration::from_millis(5),
        tie_notice_delay: Duration::from_millis(5),
        reroll_delay: Duration::from_millis(5),
        first_turn_delay: Duration::from_millis(5),
        ..Timing::default()
    }
}

/// Starts a server on a random port and returns the address.
async fn start_server_with(builder: PartyhallServerBuilder) -> String {
    let server = builder
        .bind("127.0.0.1:0")
        .timing(fast_timing())
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn start_server() -> String {
    start_server_with(PartyhallServer::builder()).await
}

/// Connects and consumes the `connected` greeting.
async fn connect(addr: &str) -> ClientWs {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    let hello = recv(&mut ws).await;
    assert_eq!(hello["type"], "connected");
    ws
}

async fn send(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

async fn recv(ws: &mut ClientWs) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .expect("recv");
    serde_json::from_slice(&msg.into_data()).expect("server sends JSON")
}

/// Reads until a message of the given type arrives, skipping the rest.
async fn recv_type(ws: &mut ClientWs, kind: &str) -> Value {
    loop {
        let value = recv(ws).await;
        if value["type"] == kind {
            return value;
        }
    }
}

async fn join(ws: &mut ClientWs, room_id: u16, name: &str, game_type: Option<&str>) -> Value {
    let mut request = json!({ "type": "join_room", "roomId": room_id, "playerName": name });
    if let Some(game_type) = game_type {
        request["gameType"] = json!(game_type);
    }
    send(ws, request).await;
    recv_type(ws, "room_joined").await
}

// =========================================================================
// Connection and lobby
// =========================================================================

#[tokio::test]
async fn test_connect_sends_connected_with_player_id() {
    let addr = start_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();

    let hello = recv(&mut ws).await;
    assert_eq!(hello["type"], "connected");
    assert!(hello["playerId"].as_u64().is_some());
}

#[tokio::test]
async fn test_join_with_game_type_creates_room() {
    let addr = start_server().await;
    let mut ana = connect(&addr).await;
    let mut ben = connect(&addr).await;

    let joined = join(&mut ana, 4242, "ana", Some("board-capture")).await;
    assert_eq!(joined["roomId"], 4242);
    assert_eq!(joined["playerIndex"], 0);
    assert_eq!(joined["gameType"], "board-capture");
    assert_eq!(joined["maxPlayers"], 2);

    let joined = join(&mut ben, 4242, "ben", None).await;
    assert_eq!(joined["playerIndex"], 1);

    let seen = recv_type(&mut ana, "player_joined").await;
    assert_eq!(seen["playerName"], "ben");
}

#[tokio::test]
async fn test_join_missing_room_without_game_type_errors() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({ "type": "join_room", "roomId": 5555 })).await;
    let err = recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["message"], "room 5555 not found");
}

#[tokio::test]
async fn test_join_while_in_room_is_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    join(&mut ws, 4300, "ana", Some("speed-match")).await;

    send(&mut ws, json!({ "type": "join_room", "roomId": 4301, "gameType": "speed-match" })).await;
    let err = recv_type(&mut ws, "error").await;
    assert_eq!(err["message"], "you are already in a room");
}

#[tokio::test]
async fn test_invalid_message_keeps_connection_open() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    let err = recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["message"], "invalid message");

    send(&mut ws, json!({ "type": "teleport" })).await;
    assert_eq!(recv(&mut ws).await["message"], "invalid message");

    send(&mut ws, json!({ "type": "leave_room" })).await;
    assert_eq!(recv(&mut ws).await["message"], "you are not in a room");
}

#[tokio::test]
async fn test_game_action_outside_room_errors() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({ "type": "flip_card" })).await;
    let err = recv(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["message"], "you are not in a room");
}

#[tokio::test]
async fn test_rate_limit_drops_excess_messages() {
    let addr =
        start_server_with(PartyhallServer::builder().rate_limit(3, Duration::from_secs(30))).await;
    let mut ws = connect(&addr).await;

    for _ in 0..4 {
        send(&mut ws, json!({ "type": "leave_room" })).await;
    }
    for _ in 0..3 {
        assert_eq!(recv(&mut ws).await["message"], "you are not in a room");
    }
    assert_eq!(recv(&mut ws).await["message"], "too many messages, slow down");
}

#[tokio::test]
async fn test_leave_room_replies_and_evicts_empty_room() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    join(&mut ws, 4400, "ana", Some("hidden-count")).await;

    send(&mut ws, json!({ "type": "leave_room" })).await;
    recv_type(&mut ws, "room_left").await;

    // The room is gone: joining it again without a game type fails.
    send(&mut ws, json!({ "type": "join_room", "roomId": 4400 })).await;
    let err = recv_type(&mut ws, "error").await;
    assert_eq!(err["message"], "room 4400 not found");
}

#[tokio::test]
async fn test_waiting_room_disconnect_removes_player() {
    let addr = start_server().await;
    let mut ana = connect(&addr).await;
    let mut ben = connect(&addr).await;
    join(&mut ana, 4500, "ana", Some("bluff-card")).await;
    join(&mut ben, 4500, "ben", None).await;

    ben.close(None).await.unwrap();

    let left = recv_type(&mut ana, "player_left").await;
    assert_eq!(left["playerIndex"], 1);
    assert_eq!(left["playerName"], "ben");
}

#[tokio::test]
async fn test_kick_player_sends_kicked_and_bans_name() {
    let addr = start_server().await;
    let mut ana = connect(&addr).await;
    let mut ben = connect(&addr).await;
    join(&mut ana, 4600, "ana", Some("speed-match")).await;
    join(&mut ben, 4600, "ben", None).await;

    send(&mut ana, json!({ "type": "kick_player", "playerIndex": 1 })).await;
    recv_type(&mut ben, "kicked").await;

    // Unbound after the kick, but the name stays banned.
    send(&mut ben, json!({ "type": "join_room", "roomId": 4600, "playerName": "ben" })).await;
    let err = recv_type(&mut ben, "error").await;
    assert!(err["message"].as_str().unwrap().contains("removed from this room"));
}

#[tokio::test]
async fn test_spectator_receives_snapshot() {
    let addr = start_server().await;
    let mut ana = connect(&addr).await;
    let mut watcher = connect(&addr).await;
    join(&mut ana, 4700, "ana", Some("number-duel")).await;

    send(&mut watcher, json!({ "type": "spectate", "roomId": 4700 })).await;
    let snapshot = recv_type(&mut watcher, "spectate_joined").await;
    assert_eq!(snapshot["gameType"], "number-duel");

    let count = recv_type(&mut ana, "spectator_count").await;
    assert_eq!(count["count"], 1);

    // Spectators can watch but not play.
    send(&mut watcher, json!({ "type": "start_game" })).await;
    let err = recv_type(&mut watcher, "error").await;
    assert_eq!(err["message"], "spectators cannot play");
}

// =========================================================================
// Full games
// =========================================================================

/// Seats two board players, starts the game, and returns them ordered
/// (first mover, second mover) with the first mover's seat index.
async fn board_game(addr: &str, room_id: u16) -> (ClientWs, ClientWs, u64) {
    let mut ana = connect(addr).await;
    let mut ben = connect(addr).await;
    join(&mut ana, room_id, "ana", Some("board-capture")).await;
    join(&mut ben, room_id, "ben", None).await;

    send(&mut ana, json!({ "type": "start_game" })).await;
    let turn = recv_type(&mut ana, "turn_start").await;
    let first = turn["playerIndex"].as_u64().unwrap();
    recv_type(&mut ben, "turn_start").await;

    if first == 0 {
        (ana, ben, first)
    } else {
        (ben, ana, first)
    }
}

async fn place(ws: &mut ClientWs, row: u8, col: u8) {
    send(ws, json!({ "type": "place_stone", "row": row, "col": col })).await;
}

#[tokio::test]
async fn test_board_game_five_in_row_ends_game() {
    let addr = start_server().await;
    let (mut black, mut white, first) = board_game(&addr, 4800).await;

    for col in 0..5 {
        place(&mut black, 0, col).await;
        let placed = recv_type(&mut white, "stone_placed").await;
        assert_eq!(placed["stone"], 1);
        if col < 4 {
            place(&mut white, 1, col).await;
            let placed = recv_type(&mut black, "stone_placed").await;
            assert_eq!(placed["stone"], 2);
        }
    }

    let over = recv_type(&mut white, "game_over").await;
    assert_eq!(over["reason"], "five_in_row");
    assert_eq!(over["winner"], first);
    assert_eq!(over["winLine"], json!([[0, 0], [0, 1], [0, 2], [0, 3], [0, 4]]));
}

#[tokio::test]
async fn test_board_game_out_of_turn_move_errors() {
    let addr = start_server().await;
    let (_black, mut white, _) = board_game(&addr, 4801).await;

    place(&mut white, 7, 7).await;
    let err = recv_type(&mut white, "error").await;
    assert_eq!(err["message"], "it is not your turn");
}

#[tokio::test]
async fn test_reconnect_by_name_restores_seat() {
    let addr = start_server().await;
    let (mut black, white, first) = board_game(&addr, 4900).await;
    let white_index = 1 - first;

    drop(white);
    let away = recv_type(&mut black, "player_away").await;
    assert_eq!(away["playerIndex"], white_index);
    let name = away["playerName"].as_str().unwrap().to_string();

    let mut back = connect(&addr).await;
    send(&mut back, json!({ "type": "reconnect", "roomId": 4900, "playerName": name })).await;
    let restored = recv_type(&mut back, "reconnected").await;
    assert_eq!(restored["playerIndex"], white_index);
    assert_eq!(restored["snapshot"]["state"], "PLAYING");

    let notice = recv_type(&mut black, "player_back").await;
    assert_eq!(notice["playerIndex"], white_index);

    // The reclaimed seat plays on.
    place(&mut black, 7, 7).await;
    let placed = recv_type(&mut back, "stone_placed").await;
    assert_eq!(placed["moveNumber"], 1);
}
