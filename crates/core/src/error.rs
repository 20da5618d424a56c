use std::io;

/// Failure reported by the backup engine. The message is passed through verbatim.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Failed(String),

    #[error("failed to start engine '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("engine i/o error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Caller addressing is incomplete or invalid. The engine is never reached.
    #[error("{0}")]
    Usage(String),

    #[error("unknown server type '{0}' (expected local, remote or all)")]
    UnknownTier(String),

    #[error("{0} is busy with another operation")]
    Busy(String),

    #[error("shadow directory is not clean; run 'clean' before starting a new backup")]
    ShadowNotClean,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

impl DispatchError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Errors the caller fixes by changing its input; the CLI prints help for these.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::UnknownTier(_))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Usage(_) => 400,
            Self::UnknownTier(_) => 404,
            Self::Busy(_) | Self::ShadowNotClean => 409,
            Self::Engine(_) | Self::Output(_) => 500,
        }
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_usage() { 2 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_message_is_verbatim() {
        let err = DispatchError::from(EngineError::failed("can't connect to clickhouse"));
        assert_eq!(err.to_string(), "can't connect to clickhouse");
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn addressing_errors_are_usage_class() {
        let missing = DispatchError::usage("backup name must be defined");
        let tier = DispatchError::UnknownTier("bogus".into());
        assert!(missing.is_usage() && tier.is_usage());
        assert_eq!(missing.status_code(), 400);
        assert_eq!(tier.status_code(), 404);
        assert_eq!(tier.exit_code(), 2);
    }

    #[test]
    fn contention_maps_to_conflict() {
        assert_eq!(DispatchError::Busy("shadow directory".into()).status_code(), 409);
        assert_eq!(DispatchError::ShadowNotClean.status_code(), 409);
        assert!(!DispatchError::ShadowNotClean.is_usage());
    }
}
