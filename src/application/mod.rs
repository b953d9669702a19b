pub mod board;
pub mod comments;
pub mod error;
pub mod pagination;
pub mod posts;
pub mod repos;
