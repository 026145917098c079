pub mod engine;
pub mod states;

pub use engine::{decide, SlotFillingController};
pub use states::{
    PendingSlots, SlotDecision, SlotReply, TokenObservation, TurnObservation,
};
