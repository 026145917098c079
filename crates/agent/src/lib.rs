//! Conversation runtime: turns a customer message into a reply.
//!
//! Each turn runs the same pipeline:
//! 1. **Context** (`waypoint_core::memory`): what earlier turns the query points back at
//! 2. **Routing** (`routing`): the model picks an intent and entities; without a
//!    model, order-shaped input or a pending lookup routes to order status
//! 3. **Resolution** (`waypoint_core::entities`): model, pattern, and context sources ranked
//! 4. **Handling** (`handlers`): one handler per intent, owned by the session
//! 5. **Phrasing**: with a model, the handler's draft is consolidated into the
//!    store's voice and then reviewed; each stage keeps the earlier text on failure
//! 6. **Recording**: the turn and its key facts go back into memory
//!
//! The model only classifies and phrases. Order lookups and promotion codes
//! stay in deterministic code.

pub mod handlers;
pub mod llm;
pub mod parsing;
pub mod prompts;
pub mod routing;
pub mod runtime;

pub use llm::{client_from_config, ChatMessage, LlmClient, ScriptedLlm, UnavailableLlm};
pub use runtime::{AgentRuntime, ConversationSession, RuntimeSettings, TurnReply};
