pub mod phone;
pub mod validation;

pub use phone::normalize_phone;
pub use validation::ValidatedJson;
