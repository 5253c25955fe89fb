// Error taxonomy for the client. Every failure ends up as one of these and
// maps to a stable process exit code (see `Error::exit_code`).

use std::path::PathBuf;

use thiserror::Error;

/// A credential or connection setting the resolver may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    ClientId,
    ClientSecret,
    DataCenterToken,
    BaseUrl,
}

impl CredentialField {
    /// Command-line flag that supplies this field.
    pub fn flag(self) -> &'static str {
        match self {
            CredentialField::ClientId => "--client-id",
            CredentialField::ClientSecret => "--client-secret",
            CredentialField::DataCenterToken => "--data-center-token",
            CredentialField::BaseUrl => "--base-url",
        }
    }

    /// Environment variable consulted when the flag is absent.
    pub fn env_var(self) -> &'static str {
        match self {
            CredentialField::ClientId => crate::config::ENV_CLIENT_ID,
            CredentialField::ClientSecret => crate::config::ENV_CLIENT_SECRET,
            CredentialField::DataCenterToken => crate::config::ENV_DC_TOKEN,
            CredentialField::BaseUrl => crate::config::ENV_BASE_URL,
        }
    }
}

impl std::fmt::Display for CredentialField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CredentialField::ClientId => "client id",
            CredentialField::ClientSecret => "client secret",
            CredentialField::DataCenterToken => "Data Center token",
            CredentialField::BaseUrl => "base URL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {field}: pass {} or set {}", .field.flag(), .field.env_var())]
    MissingCredential { field: CredentialField },

    #[error(
        "both Cloud client credentials and a Data Center token are set; \
         pass --data-center to use Data Center mode or unset {}",
        crate::config::ENV_DC_TOKEN
    )]
    ConflictingMode,

    #[error("unsupported framework type '{given}'. Supported frameworks: {supported}")]
    UnsupportedFramework { given: String, supported: String },

    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidSetting {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request failed: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("invalid JSON response: {source} - {body}")]
    InvalidResponse {
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration and usage errors, including rejected command lines.
pub const EXIT_CONFIG: u8 = 1;
pub const EXIT_FILE_ACCESS: u8 = 2;
pub const EXIT_NETWORK: u8 = 3;

impl Error {
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => EXIT_CONFIG,
            Error::FileAccess { .. } => EXIT_FILE_ACCESS,
            Error::Network { .. } | Error::Api { .. } | Error::InvalidResponse { .. } => {
                EXIT_NETWORK
            }
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
