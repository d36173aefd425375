use oms_messaging::DriverError;
use thiserror::Error;

/// Why a driver could not produce an access point.
#[derive(Debug, Error)]
pub enum ResolutionCause {
    /// Nothing is registered under the implementation id.
    #[error("no implementation registered")]
    NotRegistered,

    /// The registered factory failed.
    #[error(transparent)]
    Construction(#[from] DriverError),
}

/// Errors raised while turning an access point URI into an access point.
#[derive(Debug, Error)]
pub enum Error {
    /// The URI does not follow the access point grammar.
    #[error("malformed access point uri `{uri}`: {reason}")]
    MalformedAccessPointUri {
        /// The offending URI.
        uri: String,

        /// Which part could not be isolated.
        reason: String,
    },

    /// The implementation could not be found or constructed.
    #[error("cannot resolve driver `{driver}` (implementation `{implementation}`): {source}")]
    DriverResolutionFailure {
        /// Driver type from the URI.
        driver: String,

        /// Implementation id that was looked up.
        implementation: String,

        /// Underlying cause.
        #[source]
        source: ResolutionCause,
    },

    /// The implementation targets a different `MAJOR.MINOR` specification.
    #[error(
        "driver `{driver}` implements specification {implementation}, expected {specification}"
    )]
    IncompatibleVersion {
        /// Driver type from the URI.
        driver: String,

        /// Version reported by the implementation.
        implementation: String,

        /// Version of the resolver's specification.
        specification: String,
    },
}

impl Error {
    pub(crate) fn malformed<U, R>(uri: U, reason: R) -> Self
    where
        U: Into<String>,
        R: Into<String>,
    {
        Self::MalformedAccessPointUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for access point resolution.
pub type Result<T> = std::result::Result<T, Error>;
