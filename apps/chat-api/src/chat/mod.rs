pub mod directory;
pub mod participants;
