pub mod backup;
pub mod core;
pub mod documents;
pub mod setup;
pub mod validate;
