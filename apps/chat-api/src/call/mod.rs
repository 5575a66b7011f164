pub mod signaling;
pub mod token;
