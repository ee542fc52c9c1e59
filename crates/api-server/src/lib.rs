//! HTTP surface for the Botline governance layer: registration, feed posts,
//! direct messages, webhook ingestion, balances, and operational endpoints.

pub mod rest;
pub mod server;

pub use server::ApiServer;
