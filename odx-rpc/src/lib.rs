//! Odoo remote-call client for the odx toolkit.
//!
//! This is deliberately not a general-purpose RPC library: it speaks to the
//! two endpoints the maintenance commands need (`common.authenticate` and
//! `object.execute_kw`), over either XML-RPC or Odoo's JSON-RPC bridge.
//!
//! Call sites build domains and record values with `serde_json::json!`; the
//! client converts them to the wire value model, so
//!
//! ```ignore
//! let ids = client.search("product.brand", json!([["name", "=", name]]), json!({})).await?;
//! ```
//!
//! reads like the `execute_kw` calls in the original scripts.

mod client;
mod error;
pub mod value;
pub mod xmlrpc;

pub use client::Client;
pub use error::{Result, RpcError};
pub use value::Value;
