//! Card models: standard playing cards for the bluffing game and fruit
//! cards for the speed-match game, with their deck routines.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::random::{Randomness, shuffle};

// ---------------------------------------------------------------------------
// Playing cards
// ---------------------------------------------------------------------------

/// Card suit. Jokers get a suit of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Spade,
    Heart,
    Diamond,
    Club,
    Joker,
}

impl Suit {
    /// The four standard suits.
    pub const STANDARD: [Suit; 4] = [Suit::Spade, Suit::Heart, Suit::Diamond, Suit::Club];

    fn as_str(self) -> &'static str {
        match self {
            Suit::Spade => "spade",
            Suit::Heart => "heart",
            Suit::Diamond => "diamond",
            Suit::Club => "club",
            Suit::Joker => "joker",
        }
    }
}

/// Card rank. Ace is low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rank {
    #[serde(rename = "A")]
    Ace,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    #[serde(rename = "BIG")]
    BigJoker,
    #[serde(rename = "SMALL")]
    SmallJoker,
}

impl Rank {
    /// The thirteen ranks a play may be declared as, lowest first.
    pub const STANDARD: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    pub fn is_joker(self) -> bool {
        matches!(self, Rank::BigJoker | Rank::SmallJoker)
    }

    /// Sort key: big joker, small joker, then ace through king.
    fn order(self) -> u8 {
        match self {
            Rank::BigJoker => 0,
            Rank::SmallJoker => 1,
            standard => {
                let position = Rank::STANDARD
                    .iter()
                    .position(|r| *r == standard)
                    .unwrap_or(0);
                // position < 13
                position as u8 + 2
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::BigJoker => "BIG",
            Rank::SmallJoker => "SMALL",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single playing card. `id` is unique across all decks in a game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub suit: Suit,
    pub rank: Rank,
    pub is_joker: bool,
}

impl Card {
    fn standard(suit: Suit, rank: Rank, deck: usize) -> Self {
        Self {
            id: format!("{}-{}-{deck}", suit.as_str(), rank.as_str()),
            suit,
            rank,
            is_joker: false,
        }
    }

    fn joker(rank: Rank, deck: usize) -> Self {
        let label = if rank == Rank::BigJoker { "big" } else { "small" };
        Self {
            id: format!("joker-{label}-{deck}"),
            suit: Suit::Joker,
            rank,
            is_joker: true,
        }
    }
}

/// Cards in one standard deck including both jokers.
pub const CARDS_PER_DECK: usize = 54;

/// Builds `decks` ordered 54-card decks.
pub fn build_decks(decks: usize) -> Vec<Card> {
    let mut cards = Vec::with_capacity(decks * CARDS_PER_DECK);
    for deck in 0..decks {
        for suit in Suit::STANDARD {
            for rank in Rank::STANDARD {
                cards.push(Card::standard(suit, rank, deck));
            }
        }
        cards.push(Card::joker(Rank::BigJoker, deck));
        cards.push(Card::joker(Rank::SmallJoker, deck));
    }
    cards
}

/// Builds and shuffles the bluffing game's draw deck.
///
/// In shuffle mode the deck is cut from `decks + 1` shuffled decks, so
/// the exact composition (how many of each rank) is unknown to players.
pub fn shuffled_deck(rng: &mut dyn Randomness, decks: usize, shuffle_mode: bool) -> Vec<Card> {
    let built = if shuffle_mode { decks + 1 } else { decks };
    let mut cards = build_decks(built);
    shuffle(rng, &mut cards);
    cards.truncate(decks * CARDS_PER_DECK);
    cards
}

/// Orders a hand: big joker, small joker, then ace through king.
pub fn sort_hand(hand: &mut [Card]) {
    hand.sort_by(compare_cards);
}

fn compare_cards(a: &Card, b: &Card) -> Ordering {
    a.rank.order().cmp(&b.rank.order())
}

// ---------------------------------------------------------------------------
// Fruit cards
// ---------------------------------------------------------------------------

/// The four fruits of the speed-match deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fruit {
    Banana,
    Strawberry,
    Lime,
    Plum,
}

impl Fruit {
    pub const ALL: [Fruit; 4] = [Fruit::Banana, Fruit::Strawberry, Fruit::Lime, Fruit::Plum];

    fn as_str(self) -> &'static str {
        match self {
            Fruit::Banana => "banana",
            Fruit::Strawberry => "strawberry",
            Fruit::Lime => "lime",
            Fruit::Plum => "plum",
        }
    }
}

/// A card showing `count` pieces of one fruit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FruitCard {
    pub id: String,
    pub fruit: Fruit,
    pub count: u8,
}

/// How many copies of each count exist per fruit.
const FRUIT_COPIES: [(u8, usize); 5] = [(1, 3), (2, 3), (3, 3), (4, 3), (5, 2)];

/// The total a fruit must reach for a bell ring to be correct.
pub const BELL_TARGET: u32 = 5;

/// Builds the ordered 56-card fruit deck.
pub fn build_fruit_deck() -> Vec<FruitCard> {
    let mut cards = Vec::new();
    for fruit in Fruit::ALL {
        for (count, copies) in FRUIT_COPIES {
            for copy in 0..copies {
                cards.push(FruitCard {
                    id: format!("{}-{count}-{copy}", fruit.as_str()),
                    fruit,
                    count,
                });
            }
        }
    }
    cards
}

/// Returns the first fruit whose visible total is exactly five.
pub fn fruit_reaching_target<'a>(tops: impl IntoIterator<Item = &'a FruitCard>) -> Option<Fruit> {
    let mut totals = [0u32; 4];
    for card in tops {
        if let Some(slot) = Fruit::ALL.iter().position(|f| *f == card.fruit) {
            totals[slot] += u32::from(card.count);
        }
    }
    Fruit::ALL
        .into_iter()
        .zip(totals)
        .find(|(_, total)| *total == BELL_TARGET)
        .map(|(fruit, _)| fruit)
}

// ---------------------------------------------------------------------------
// Dealing
// ---------------------------------------------------------------------------

/// Deals `cards` one at a time around `hands` seats.
pub fn deal_round_robin<T>(cards: Vec<T>, hands: usize) -> Vec<Vec<T>> {
    let mut dealt: Vec<Vec<T>> = (0..hands).map(|_| Vec::new()).collect();
    if hands == 0 {
        return dealt;
    }
    for (i, card) in cards.into_iter().enumerate() {
        dealt[i % hands].push(card);
    }
    dealt
}
