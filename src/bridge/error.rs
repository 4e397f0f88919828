use serde::Serialize;

use super::binding::ArgumentError;

/// Which side of the contract a [`BridgeError`] violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The bridge was used out of order (before binding, bound twice).
    Lifecycle,
    /// The UI sent something the bound object cannot answer.
    Protocol,
}

/// Contract violations raised synchronously at the dispatch boundary.
///
/// Errors raised *inside* a bound method never show up here: they are
/// captured by the exception boundary and delivered as a call-failure payload.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge has no bound object")]
    NotBound,
    #[error("bridge is already bound")]
    AlreadyBound,
    #[error("binding targets bridge {binding:?}, not {bridge:?}")]
    ForeignBinding { bridge: String, binding: String },
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid arguments for {method}: {source}")]
    InvalidArguments {
        method: String,
        #[source]
        source: ArgumentError,
    },
    #[error("unknown request id: {0}")]
    UnknownRequest(String),
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotBound | Self::AlreadyBound | Self::ForeignBinding { .. } => ErrorKind::Lifecycle,
            Self::MethodNotFound(_)
            | Self::InvalidArguments { .. }
            | Self::UnknownRequest(_)
            | Self::Encoding(_) => ErrorKind::Protocol,
        }
    }
}

impl Serialize for BridgeError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(BridgeError::NotBound.kind(), ErrorKind::Lifecycle);
        assert_eq!(BridgeError::AlreadyBound.kind(), ErrorKind::Lifecycle);
        assert_eq!(BridgeError::UnknownRequest("r1".into()).kind(), ErrorKind::Protocol);

        let err = BridgeError::InvalidArguments {
            method: "add".into(),
            source: ArgumentError::Arity { expected: 2, actual: 1 },
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(
            err.to_string(),
            "invalid arguments for add: expected 2 arguments, got 1"
        );
    }

    #[test]
    fn serializes_as_message() {
        let json = serde_json::to_string(&BridgeError::NotBound).unwrap();
        assert_eq!(json, "\"bridge has no bound object\"");
    }
}
