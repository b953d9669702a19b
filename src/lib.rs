//! Agora is a small self-hosted discussion board: posts go through a
//! moderation queue, approved posts appear on a searchable dashboard, and
//! readers attach comments in batches.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
