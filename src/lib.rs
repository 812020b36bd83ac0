//! MycoKV - async client for the MycoKV key-value store
//!
//! This library speaks MycoKV's line-oriented text protocol over a single
//! TCP connection:
//! - GET, PUT, DELETE, EXPIRE and PURGE with typed values
//! - Wildcard reads (`kitchen.*`, `kitchen.*2`) returning nested trees
//! - Client-side key validation before anything is sent
//! - Typed server errors for the E01-E15 response codes

pub mod client;
pub mod error;
pub mod key;
pub mod protocol;
pub mod value;

pub use client::{Client, ClientConfig, ConnectionState, Entry};
pub use error::{ErrorCode, KeyFormatError, MycoKvError, Result, ServerError, ValueTypeError};
pub use key::{KeyContext, KeyKind};
pub use protocol::Command;
pub use value::{Nested, Node, Tree, Value};
