use tracing::{info, warn};

use crate::dialogue::states::{
    PendingSlots, SlotDecision, SlotReply, TokenObservation, TurnObservation,
};
use crate::domain::order::OrderBook;
use crate::slots::{SlotKey, SlotStore};

/// Pure transition table for the two-slot order lookup.
///
/// `fallback_exhausted` is set once the free-form extraction has been consulted
/// for this turn; it turns the last-resort row into a request for both tokens.
pub fn decide(
    pending: &PendingSlots,
    observation: &TurnObservation,
    fallback_exhausted: bool,
) -> SlotDecision {
    use SlotDecision::{
        AskForBoth, AskForIdentity, AskForReference, AttemptCompletion, FreeFormFallback,
        RejectIdentity, RejectReference, StoreIdentity, StoreReference,
    };
    use TokenObservation::{Absent, Malformed, Valid};

    match (&pending.identity, &pending.reference, &observation.identity, &observation.reference) {
        (_, _, Valid(identity), Valid(reference)) => {
            AttemptCompletion { identity: identity.clone(), reference: reference.clone() }
        }
        // A stored counterpart beats a stray token on the other side.
        (_, Some(reference), Valid(identity), _) => {
            AttemptCompletion { identity: identity.clone(), reference: reference.clone() }
        }
        (Some(identity), _, _, Valid(reference)) => {
            AttemptCompletion { identity: identity.clone(), reference: reference.clone() }
        }
        (_, None, Valid(identity), Malformed(rejected)) => StoreIdentity {
            identity: identity.clone(),
            rejected_reference: Some(rejected.clone()),
        },
        (_, None, Valid(identity), Absent) => {
            StoreIdentity { identity: identity.clone(), rejected_reference: None }
        }
        (None, _, Malformed(rejected), Valid(reference)) => StoreReference {
            reference: reference.clone(),
            rejected_identity: Some(rejected.clone()),
        },
        (None, _, Absent, Valid(reference)) => {
            StoreReference { reference: reference.clone(), rejected_identity: None }
        }
        (Some(identity), _, _, Malformed(rejected)) => {
            RejectReference { identity: identity.clone(), rejected: rejected.clone() }
        }
        (_, Some(reference), Malformed(rejected), _) => {
            RejectIdentity { reference: reference.clone(), rejected: rejected.clone() }
        }
        (Some(identity), Some(reference), Absent, Absent) => {
            AttemptCompletion { identity: identity.clone(), reference: reference.clone() }
        }
        (Some(identity), None, _, Absent) => AskForReference { identity: identity.clone() },
        (None, Some(reference), Absent, _) => AskForIdentity { reference: reference.clone() },
        (None, None, _, _) if fallback_exhausted => AskForBoth,
        (None, None, _, _) => FreeFormFallback,
    }
}

/// Owns the per-session slot store and runs decisions against an order book.
pub struct SlotFillingController<O> {
    slots: SlotStore,
    orders: O,
}

impl<O> SlotFillingController<O>
where
    O: OrderBook,
{
    pub fn new(orders: O) -> Self {
        Self { slots: SlotStore::new(), orders }
    }

    pub fn slots(&self) -> &SlotStore {
        &self.slots
    }

    pub fn pending(&self) -> PendingSlots {
        PendingSlots::from_store(&self.slots)
    }

    pub fn plan(&self, observation: &TurnObservation) -> SlotDecision {
        decide(&self.pending(), observation, false)
    }

    pub fn plan_after_fallback(&self, observation: &TurnObservation) -> SlotDecision {
        decide(&self.pending(), observation, true)
    }

    /// Applies a decision. The store is cleared only when a completion attempt
    /// finds the order. A pending [`SlotDecision::FreeFormFallback`] that was
    /// never resolved is answered like [`SlotDecision::AskForBoth`].
    pub fn execute(&mut self, decision: SlotDecision) -> SlotReply {
        info!(
            event_name = "dialogue.slot_decision",
            decision = decision.kind(),
            filled = self.slots.len(),
            "slot decision applied"
        );

        match decision {
            SlotDecision::AttemptCompletion { identity, reference } => {
                match self.orders.find_order(&identity, &reference) {
                    Some(order) => {
                        self.slots.clear();
                        info!(
                            event_name = "dialogue.order.found",
                            order_number = %reference,
                            "order lookup completed"
                        );
                        SlotReply::Completed { order, identity, reference }
                    }
                    None => {
                        warn!(
                            event_name = "dialogue.order.not_found",
                            order_number = %reference,
                            "order lookup found nothing, keeping collected slots"
                        );
                        SlotReply::NotFound { identity, reference }
                    }
                }
            }
            SlotDecision::StoreIdentity { identity, rejected_reference } => {
                self.slots.set(SlotKey::Identity, identity.as_str());
                match rejected_reference {
                    Some(rejected) => SlotReply::InvalidReference { identity, rejected },
                    None => SlotReply::AwaitingReference { identity, repeated: false },
                }
            }
            SlotDecision::StoreReference { reference, rejected_identity } => {
                self.slots.set(SlotKey::Reference, reference.as_str());
                match rejected_identity {
                    Some(rejected) => SlotReply::InvalidIdentity { reference, rejected },
                    None => SlotReply::AwaitingIdentity { reference, repeated: false },
                }
            }
            SlotDecision::RejectReference { identity, rejected } => {
                SlotReply::InvalidReference { identity, rejected }
            }
            SlotDecision::RejectIdentity { reference, rejected } => {
                SlotReply::InvalidIdentity { reference, rejected }
            }
            SlotDecision::AskForReference { identity } => {
                SlotReply::AwaitingReference { identity, repeated: true }
            }
            SlotDecision::AskForIdentity { reference } => {
                SlotReply::AwaitingIdentity { reference, repeated: true }
            }
            SlotDecision::FreeFormFallback | SlotDecision::AskForBoth => SlotReply::NeedBoth,
        }
    }
}
