//! Constellation Node Library
//!
//! Both roles of a Constellation peer: the requester that pulls files from
//! other peers and the provider that serves local files to them.

pub mod catalog;
pub mod config;
pub mod filelist;
pub mod provider;
pub mod requester;

pub use catalog::Catalog;
pub use config::{Settings, TransferOptions};
pub use provider::{Provider, SessionReport};
pub use requester::{fetch_all, FetchReport, Requester};
