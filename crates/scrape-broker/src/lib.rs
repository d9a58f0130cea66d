//! # scrape-broker
//!
//! Everything between a collector and the broker's management interface.
//!
//! This crate provides:
//! - The process-wide admission controller bounding concurrent broker calls
//! - The HTTP broker client with Basic and OAuth2 authorization
//! - The paginated query executor and its pagination state
//! - Envelope codecs for the XML command and JSON monitor flavors

pub mod admission;
pub mod auth;
pub mod client;
pub mod pagination;
pub mod semp_v1;
pub mod semp_v2;

// Re-export commonly used types
pub use admission::{AdmissionController, AdmissionTicket};
pub use auth::{BrokerAuth, OAuthTokenSource};
pub use client::BrokerClient;
pub use pagination::{Page, PagedQuery, PaginationState, QueryExecutor, DEFAULT_MAX_PAGES};
pub use semp_v1::{decode_reply, Reply, ShowCommand};
pub use semp_v2::{decode_collection, MonitorRequest};
