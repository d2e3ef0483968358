pub mod account;
pub mod capability;
pub mod claims;
pub mod session;

pub use account::Account;
pub use capability::{CapabilityError, CapabilityMatrix};
pub use claims::{Claims, Grant, Level, TokenKind, TOKEN_VERSION};
pub use session::{SessionPurpose, VerificationSession};
