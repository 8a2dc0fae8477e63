use thiserror::Error;

pub type KpxResult<T> = Result<T, KpxError>;

/// Every failure the codec reports to its callers.
///
/// Wrong credentials and a corrupted body both surface as
/// [`KpxError::CouldNotDecrypt`]; the two are never told apart.
#[derive(Debug, Error)]
pub enum KpxError {
    #[error("invalid file signature: {0}")]
    SignatureInvalid(String),

    #[error("unsupported format version: {0:#010x}")]
    UnsupportedVersion(u32),

    #[error("malformed header field: {0}")]
    HeaderFieldMalformed(String),

    #[error("header integrity check failed")]
    HeaderIntegrityMismatch,

    #[error("could not decrypt: wrong credentials or corrupted data")]
    CouldNotDecrypt,

    #[error("malformed document: {0}")]
    DocumentMalformed(String),

    #[error("unable to read file: {0}")]
    UnableToReadFile(#[from] std::io::Error),

    #[error("operation cancelled")]
    OperationCancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KpxError {
    pub fn header(msg: impl Into<String>) -> Self {
        KpxError::HeaderFieldMalformed(msg.into())
    }

    pub fn document(msg: impl Into<String>) -> Self {
        KpxError::DocumentMalformed(msg.into())
    }

    /// True for failures caused by the caller's cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, KpxError::OperationCancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_to_unable_to_read() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: KpxError = io.into();
        assert!(matches!(err, KpxError::UnableToReadFile(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_decrypt_error_does_not_leak_cause() {
        let msg = KpxError::CouldNotDecrypt.to_string();
        assert_eq!(msg, "could not decrypt: wrong credentials or corrupted data");
    }

    #[test]
    fn test_version_formats_as_hex() {
        let msg = KpxError::UnsupportedVersion(0x0005_0000).to_string();
        assert!(msg.ends_with("0x00050000"), "got: {msg}");
    }
}
