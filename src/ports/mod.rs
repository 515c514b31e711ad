//! Collaborators the engine consumes but does not implement for production:
//! time, offer delivery and proof-of-completion checks.

pub mod clock;
pub mod notifier;
pub mod proof;

pub use clock::{Clock, ManualClock, SystemClock};
pub use notifier::{LoggingNotifier, Notifier, OfferNotice};
pub use proof::{BasicProofValidator, CompletionProof, ProofValidator};
