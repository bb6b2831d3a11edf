pub mod session;
pub mod settings;
pub mod signup;

pub use session::{NewSessionRequest, Session, SessionAvailability, UpdateSessionRequest};
pub use settings::{SignupDeadline, SignupWindow};
pub use signup::{NewSignup, Signup, SubmitSignupRequest};
