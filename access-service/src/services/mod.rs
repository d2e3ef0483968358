pub mod accounts;
pub mod collections;
pub mod delivery;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod sessions;
pub mod token;
pub mod verification;

pub use accounts::{AccountStore, AccountStoreError, InMemoryAccountStore};
pub use collections::{Collection, CollectionError, CollectionSource, InMemoryCollections};
pub use delivery::{CodeDelivery, DeliveryError, LogDelivery, MockCodeDelivery, NotificationDelivery};
pub use error::FlowError;
pub use gate::{AllowReason, AuthorizationGate, Decision, DenyReason};
pub use sessions::{ConsumeOutcome, SessionStore};
pub use token::{IssuedToken, Token, TokenCodec, TokenError};
pub use verification::{spawn_session_sweeper, Clock, VerificationFlow, VerificationPolicy};
