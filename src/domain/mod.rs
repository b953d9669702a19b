pub mod entities;
pub mod error;
pub mod policy;
pub mod types;
