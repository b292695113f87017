//! The two-player opening roll used by the duel and board games.

use crate::message::ServerMessage;
use crate::session::{RoomSession, TimerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Roll,
    AnnounceTie,
    Decided(usize),
}

/// Rolls one die per seat until they differ; the higher roll moves first.
///
/// Each step runs off the room's `Phase` timer so clients can animate.
#[derive(Debug)]
pub(crate) struct OpeningRoll {
    step: Step,
    dice: Option<[u8; 2]>,
}

impl Default for OpeningRoll {
    fn default() -> Self {
        Self {
            step: Step::Roll,
            dice: None,
        }
    }
}

impl OpeningRoll {
    /// The last dice shown.
    pub(crate) fn dice(&self) -> Option<[u8; 2]> {
        self.dice
    }

    pub(crate) fn begin<S>(&mut self, session: &mut RoomSession<S>) {
        self.step = Step::Roll;
        self.dice = None;
        let delay = session.settings().timing.dice_delay;
        session.schedule(TimerKey::Phase, delay);
    }

    /// Runs the next step. Returns the first player once the result has
    /// been on screen long enough.
    pub(crate) fn advance<S>(&mut self, session: &mut RoomSession<S>) -> Option<usize> {
        let timing = session.settings().timing.clone();
        match self.step {
            Step::Roll => {
                let dice = [session.rng().roll_die(), session.rng().roll_die()];
                self.dice = Some(dice);
                session.broadcast(ServerMessage::DiceResult {
                    dice: dice.to_vec(),
                });
                if dice[0] == dice[1] {
                    self.step = Step::AnnounceTie;
                    session.schedule(TimerKey::Phase, timing.tie_notice_delay);
                } else {
                    let first = if dice[0] > dice[1] { 0 } else { 1 };
                    self.step = Step::Decided(first);
                    session.schedule(TimerKey::Phase, timing.first_turn_delay);
                }
                tracing::debug!(room_id = %session.room_id(), ?dice, "opening roll");
                None
            }
            Step::AnnounceTie => {
                session.broadcast(ServerMessage::DiceTie {
                    tied_players: vec![0, 1],
                });
                self.step = Step::Roll;
                session.schedule(TimerKey::Phase, timing.reroll_delay);
                None
            }
            Step::Decided(first) => Some(first),
        }
    }
}
