pub mod config;
pub mod error;
pub mod types;

pub use error::{KpxError, KpxResult};
pub use types::{CipherId, Compression, FormatVersion, InnerStreamId, KdfAlgorithm};
