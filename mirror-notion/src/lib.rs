//! # mirror-notion
//!
//! Notion implementation of the [`DocumentService`](mirror_sync::DocumentService)
//! contract: database listing, page content as markdown, and content
//! replacement, plus the token providers that authenticate it.

pub mod blocks;
pub mod client;
pub mod error;
pub mod token;

pub use client::{format_id, NotionClient};
pub use error::NotionError;
pub use token::{EnvToken, KeychainToken, StaticToken, TokenChain, TokenProvider};
