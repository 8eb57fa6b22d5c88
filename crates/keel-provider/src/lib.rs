//! Linode API access for Keel
//!
//! [`LinodeApi`] is the capability trait the managed resource adapters call;
//! [`LinodeClient`] implements it over HTTPS with bearer-token auth.

pub mod api;
pub mod client;
pub mod types;

pub use api::LinodeApi;
pub use client::{LinodeClient, LinodeClientConfig, DEFAULT_API_URL};
