//! kpx-format: the encrypted container codec
//!
//! # Overview
//! - `header`: signature, version, TLV outer header fields
//! - `variant`: typed dictionary carrying V4 KDF parameters
//! - `hashed_block` / `hmac_block`: V3 and V4 body block streams
//! - `compression`: chunked gzip with cancellation
//! - `inner_header`: V4 inner stream setup and binaries
//! - `reader` / `writer`: the two-phase read pipeline and its inverse

mod bytes;
pub mod compression;
pub mod hashed_block;
pub mod header;
pub mod hmac_block;
pub mod inner_header;
pub mod reader;
pub mod variant;
pub mod writer;

pub use header::{HeaderSummary, OuterHeader};
pub use reader::KdbxReader;
pub use variant::{Variant, VariantDictionary};
pub use writer::KdbxWriter;
