pub mod tokens;

pub use tokens::{Claims, TokenVerifier};
