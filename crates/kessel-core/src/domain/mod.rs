//! Domain model (ids, message, results, state, errors, ...).
//!
//! Pure values only: nothing here touches storage or the runtime.

pub mod eligibility;
pub mod errors;
pub mod ids;
pub mod message;
pub mod outcome;
pub mod retry;
pub mod state;

pub use eligibility::{DeadLetterReason, Eligibility};
pub use errors::{KesselError, Result};
pub use ids::MessageId;
pub use message::{Header, Message, PAYLOAD_KEY, Schedule};
pub use outcome::{RequestResult, ResultKind};
pub use retry::RetryPolicy;
pub use state::MessageState;
