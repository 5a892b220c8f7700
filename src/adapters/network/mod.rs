//! Identity network and partner service clients.

pub mod client;
pub mod mock;
pub mod models;
pub mod partner;

pub use client::{flatten_thread, XrpcClient};
pub use mock::{MockNetworkClient, SentPost};
pub use partner::{HttpPartnerClient, PARTNER_API_SOURCE};
