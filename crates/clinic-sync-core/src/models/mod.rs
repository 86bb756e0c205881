//! Domain aggregates replicated between clinic replicas.

mod medication;
mod patient;
mod payment;
mod reference;
mod sale;
mod state;
mod visit;

pub use medication::*;
pub use patient::*;
pub use payment::*;
pub use reference::*;
pub use sale::*;
pub use state::*;
pub use visit::*;
