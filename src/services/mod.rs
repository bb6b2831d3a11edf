pub mod capacity;
pub mod selection;
pub mod workflow;

pub use capacity::Seats;
pub use selection::{SessionSelection, Toggle, MAX_SELECTED_SESSIONS};
pub use workflow::{FormState, SignupForm, SignupWorkflow};
