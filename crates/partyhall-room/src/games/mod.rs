//! The five games.

mod bluff_card;
mod board_capture;
mod dice;
mod hidden_count;
mod number_duel;
mod speed_match;

pub use bluff_card::BluffCard;
pub use board_capture::BoardCapture;
pub use hidden_count::HiddenCount;
pub use number_duel::NumberDuel;
pub use speed_match::SpeedMatch;
