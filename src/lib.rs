//! A client for automating work on MediaWiki wikis.
//!
//! A [`Registry`] hands out one [`Site`] per wiki and account. Sites talk to
//! the server through a shared pool of HTTP worker threads, and [`Page`]s
//! fetch their content through their site on first use. [`generators`] list
//! pages in bulk, filter them, and preload their text.

pub mod api;
pub mod config;
pub mod error;
pub mod family;
pub mod generators;
pub mod http;
pub mod link;
pub mod page;
pub mod site;
pub mod title;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use family::Family;
pub use link::Link;
pub use page::Page;
pub use site::{Registry, Site};
