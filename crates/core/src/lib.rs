pub mod config;
pub mod dialogue;
pub mod domain;
pub mod entities;
pub mod errors;
pub mod memory;
pub mod reference;
pub mod slots;

pub use config::{AppConfig, ConfigError, LlmProvider, LoadOptions, LogFormat};
pub use dialogue::{
    decide, PendingSlots, SlotDecision, SlotFillingController, SlotReply, TokenObservation,
    TurnObservation,
};
pub use domain::intent::Intent;
pub use domain::order::{
    CustomerEmail, InMemoryOrderBook, Order, OrderBook, OrderNumber, OrderSummary,
};
pub use domain::product::{Product, ProductCatalog};
pub use entities::{
    EntityField, EntityResolver, EntitySource, EntityValue, ModelEntities, ResolvedEntities,
};
pub use errors::{ApplicationError, DataError, DomainError, InterfaceError};
pub use memory::{ContextSnapshot, ContextualInfo, ConversationMemory, KeyInfo, TurnRecord};
pub use reference::ReferenceMatcher;
pub use slots::{SlotKey, SlotStore};
