//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces the adapters implement:
//! - QuestRepository: quest definitions
//! - CursorRepository: durable stream positions
//! - DomainStore: users, timeline entries, collectibles, kindred pairs
//! - NetworkClient: the identity network
//! - PartnerClient: the partner service

pub mod cursor_repository;
pub mod domain_store;
pub mod network_client;
pub mod partner_client;
pub mod quest_repository;

pub use cursor_repository::CursorRepository;
pub use domain_store::DomainStore;
pub use network_client::{NetworkClient, ThreadReplies, ThreadStats};
pub use partner_client::PartnerClient;
pub use quest_repository::QuestRepository;
