//! Board capture: five in a row on a 15×15 grid.

use partyhall_protocol::PlayerId;
use tokio::time::Instant;

use super::dice::OpeningRoll;
use crate::error::RoomError;
use crate::game::GameRoom;
use crate::message::{GameAction, GameOver, GameOverReason, GameView, SeatView, ServerMessage, StoneMove};
use crate::random::choose;
use crate::session::{ClientHandle, RoomSession, TimerKey};

pub const BOARD_SIZE: usize = 15;

/// Stones needed in one line to win.
const LINE: usize = 5;

/// Row/column steps for the four axes: horizontal, vertical, and both
/// diagonals.
const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

const BLACK: u8 = 1;
const WHITE: u8 = 2;

type Board = [[u8; BOARD_SIZE]; BOARD_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Rolling,
    Playing,
    Finished,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Waiting => "WAITING",
            Phase::Rolling => "ROLLING",
            Phase::Playing => "PLAYING",
            Phase::Finished => "FINISHED",
        }
    }
}

fn stone_at(board: &Board, row: isize, col: isize) -> Option<u8> {
    let row = usize::try_from(row).ok()?;
    let col = usize::try_from(col).ok()?;
    board.get(row)?.get(col).copied()
}

/// The first axis through `(row, col)` holding at least five `stone`s in
/// an unbroken run, sorted by row then column.
fn winning_line(board: &Board, row: usize, col: usize, stone: u8) -> Option<Vec<[usize; 2]>> {
    let (row, col) = (row as isize, col as isize);
    AXES.iter().find_map(|&(dr, dc)| {
        let mut line = vec![[row as usize, col as usize]];
        for sign in [1, -1] {
            for step in 1..LINE as isize {
                let r = row + dr * step * sign;
                let c = col + dc * step * sign;
                if stone_at(board, r, c) != Some(stone) {
                    break;
                }
                // In bounds: stone_at found a stone there.
                line.push([r as usize, c as usize]);
            }
        }
        (line.len() >= LINE).then(|| {
            line.sort_unstable();
            line
        })
    })
}

fn in_bounds(value: i64) -> Option<usize> {
    usize::try_from(value).ok().filter(|v| *v < BOARD_SIZE)
}

#[derive(Debug)]
pub struct BoardCapture {
    session: RoomSession<()>,
    phase: Phase,
    roll: OpeningRoll,
    board: Board,
    current_turn: Option<usize>,
    history: Vec<StoneMove>,
    winner: Option<usize>,
    win_line: Option<Vec<[usize; 2]>>,
    turn_started: Option<Instant>,
}

impl BoardCapture {
    /// Black belongs to whoever made the first move; before any move, to
    /// the player whose turn it is.
    fn stone_for(&self, index: usize) -> u8 {
        let first = self
            .history
            .first()
            .map(|m| m.player_index)
            .or(self.current_turn);
        if first == Some(index) { BLACK } else { WHITE }
    }

    fn empty_cells(&self) -> Vec<(usize, usize)> {
        let mut cells = Vec::new();
        for (r, row) in self.board.iter().enumerate() {
            for (c, &stone) in row.iter().enumerate() {
                if stone == 0 {
                    cells.push((r, c));
                }
            }
        }
        cells
    }

    fn start_game(&mut self, index: usize) {
        if self.phase != Phase::Waiting {
            self.session.send_error(index, "the game has already started");
            return;
        }
        if index != 0 {
            self.session.send_error(index, "only the host can start the game");
            return;
        }
        if self.session.player_count() < 2 {
            self.session.send_error(index, "waiting for an opponent");
            return;
        }
        self.phase = Phase::Rolling;
        self.session.broadcast_state(self.phase.name());
        self.roll.begin(&mut self.session);
        tracing::info!(room_id = %self.session.room_id(), "board game started");
    }

    fn start_playing(&mut self, first: usize) {
        self.phase = Phase::Playing;
        self.board = [[0; BOARD_SIZE]; BOARD_SIZE];
        self.history.clear();
        self.winner = None;
        self.win_line = None;
        self.current_turn = Some(first);
        self.session.broadcast_state(self.phase.name());
        self.session.broadcast(ServerMessage::FirstPlayer {
            player_index: first,
            player_name: self.session.name_of(first),
        });
        self.start_turn(first);
    }

    fn start_turn(&mut self, index: usize) {
        self.turn_started = Some(Instant::now());
        let settings = self.session.settings();
        let limit = settings.turn_deadline();
        self.session.broadcast(ServerMessage::TurnStart {
            player_index: index,
            player_name: self.session.name_of(index),
            time_limit: settings.turn_millis(),
            round_number: None,
            bluff: None,
            table: None,
        });
        self.session.schedule(TimerKey::Turn, limit);
    }

    fn place_stone(&mut self, index: usize, row: i64, col: i64) {
        if self.phase != Phase::Playing {
            self.session.send_error(index, "the game is not in progress");
            return;
        }
        if self.current_turn != Some(index) {
            self.session.send_error(index, "it is not your turn");
            return;
        }
        let deadline = self.session.settings().turn_deadline();
        if self.turn_started.is_some_and(|start| start.elapsed() > deadline) {
            self.session.send_error(index, "your turn has timed out");
            return;
        }
        let (Some(row), Some(col)) = (in_bounds(row), in_bounds(col)) else {
            self.session.send_error(index, "that position is off the board");
            return;
        };
        if self.board[row][col] != 0 {
            self.session.send_error(index, "that position is already taken");
            return;
        }
        self.session.cancel(TimerKey::Turn);
        self.execute(index, row, col);
    }

    fn turn_timed_out(&mut self) {
        let Some(index) = self.current_turn else {
            return;
        };
        let cells = self.empty_cells();
        let Some(&(row, col)) = choose(self.session.rng(), &cells) else {
            return;
        };
        self.session
            .broadcast(ServerMessage::TurnTimeout { player_index: index });
        self.execute(index, row, col);
    }

    fn execute(&mut self, index: usize, row: usize, col: usize) {
        let stone = self.stone_for(index);
        self.board[row][col] = stone;
        self.history.push(StoneMove {
            player_index: index,
            row,
            col,
            stone,
        });
        let move_number = self.history.len();
        self.session.broadcast(ServerMessage::StonePlaced {
            player_index: index,
            row,
            col,
            stone,
            move_number,
        });

        if let Some(line) = winning_line(&self.board, row, col, stone) {
            self.phase = Phase::Finished;
            self.winner = Some(index);
            self.win_line = Some(line.clone());
            let mut over = GameOver::new(Some(index), GameOverReason::FiveInRow);
            over.winner_name = Some(self.session.name_of(index));
            over.win_line = Some(line);
            self.session.broadcast(ServerMessage::GameOver(over));
            tracing::info!(room_id = %self.session.room_id(), winner = index, moves = move_number, "five in a row");
            self.finish();
            return;
        }
        if self.board.iter().flatten().all(|&cell| cell != 0) {
            self.phase = Phase::Finished;
            self.session
                .broadcast(ServerMessage::GameOver(GameOver::new(None, GameOverReason::Draw)));
            tracing::info!(room_id = %self.session.room_id(), "board full, draw");
            self.finish();
            return;
        }

        let next = 1 - index;
        self.current_turn = Some(next);
        self.start_turn(next);
    }

    fn finish(&mut self) {
        self.session.cancel(TimerKey::Turn);
        let delay = self.session.settings().timing.dissolve_delay;
        self.session.schedule_dissolve(delay);
    }

    fn forfeit(&mut self, winner: usize, leaver: usize, leaver_name: String) {
        self.phase = Phase::Finished;
        self.winner = Some(winner);
        self.session.send_to(
            winner,
            ServerMessage::OpponentDisconnected {
                player_index: leaver,
                player_name: leaver_name.clone(),
            },
        );
        self.session.send_to_spectators(ServerMessage::PlayerDisconnected {
            player_index: leaver,
            player_name: leaver_name,
        });
        let mut over = GameOver::new(Some(winner), GameOverReason::Disconnect);
        over.winner_name = Some(self.session.name_of(winner));
        self.session.broadcast(ServerMessage::GameOver(over));
        self.finish();
    }
}

impl GameRoom for BoardCapture {
    type Seat = ();

    fn create(session: RoomSession<()>) -> Self {
        Self {
            session,
            phase: Phase::Waiting,
            roll: OpeningRoll::default(),
            board: [[0; BOARD_SIZE]; BOARD_SIZE],
            current_turn: None,
            history: Vec::new(),
            winner: None,
            win_line: None,
            turn_started: None,
        }
    }

    fn session(&self) -> &RoomSession<()> {
        &self.session
    }

    fn session_mut(&mut self) -> &mut RoomSession<()> {
        &mut self.session
    }

    fn phase_name(&self) -> &'static str {
        self.phase.name()
    }

    fn is_waiting(&self) -> bool {
        self.phase == Phase::Waiting
    }

    fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    fn add_player(&mut self, client: ClientHandle, name: String) -> Result<usize, RoomError> {
        let index = self.seat_player(client, name, ())?;
        self.broadcast_player_list();
        Ok(index)
    }

    fn remove_player(&mut self, player: PlayerId) {
        let Some(index) = self.session.index_of(player) else {
            return;
        };
        let name = self.session.name_of(index);
        self.session.seats_mut()[index] = None;
        self.session.cancel(TimerKey::Turn);
        self.session.cancel(TimerKey::Phase);
        tracing::info!(room_id = %self.session.room_id(), %player, phase = self.phase.name(), "player removed");

        let other = 1 - index;
        let other_present = self.session.is_seated(other);
        match self.phase {
            Phase::Rolling | Phase::Playing => {
                if other_present {
                    self.forfeit(other, index, name);
                } else {
                    self.phase = Phase::Finished;
                    self.finish();
                }
            }
            Phase::Waiting => {
                if other_present && other != 0 {
                    self.session.seats_mut().swap(0, other);
                    self.session
                        .send_to(0, ServerMessage::PlayerIndexUpdate { player_index: 0 });
                }
                self.session.broadcast(ServerMessage::PlayerLeft {
                    player_index: index,
                    player_name: name,
                });
                self.session.broadcast_state(self.phase.name());
                self.broadcast_player_list();
            }
            Phase::Finished => {
                self.session.broadcast(ServerMessage::PlayerLeft {
                    player_index: index,
                    player_name: name,
                });
            }
        }
    }

    fn handle_message(&mut self, sender: PlayerId, action: GameAction) {
        let Some(index) = self.session.index_of(sender) else {
            tracing::debug!(%sender, "action from unseated connection ignored");
            return;
        };
        match action {
            GameAction::StartGame => self.start_game(index),
            GameAction::PlaceStone { row, col } => self.place_stone(index, row, col),
            other => self.session.send_error(
                index,
                format!("`{}` is not a board game action", other.name()),
            ),
        }
    }

    fn on_timer(&mut self, key: TimerKey) {
        match (key, self.phase) {
            (TimerKey::Phase, Phase::Rolling) => {
                if let Some(first) = self.roll.advance(&mut self.session) {
                    self.start_playing(first);
                }
            }
            (TimerKey::Turn, Phase::Playing) => self.turn_timed_out(),
            _ => {}
        }
    }

    fn player_views(&self) -> Vec<Option<SeatView>> {
        self.session.seat_views(|seat| seat.view())
    }

    fn game_view(&self) -> GameView {
        GameView::BoardCapture {
            current_turn: self.current_turn,
            board: self.board.iter().map(|row| row.to_vec()).collect(),
            history: self.history.clone(),
            winner: self.winner,
            win_line: self.win_line.clone(),
            dice: self.roll.dice(),
            turn_time_remaining: (self.phase == Phase::Playing)
                .then(|| self.session.turn_remaining_millis())
                .flatten(),
        }
    }
}
