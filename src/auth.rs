//! Credential resolution.
//!
//! [`resolve`] merges command-line flags with a [`ConfigSource`] and decides
//! which authentication mode is active:
//!
//! * an explicit Data Center switch always selects Data Center mode;
//! * a Data Center token alone implies Data Center mode, but conflicts with a
//!   complete set of Cloud client credentials;
//! * anything else is Cloud mode.
//!
//! The resulting [`AuthContext`] derives its mode from the credential it
//! holds, so the two can never disagree.

use std::fmt;

use clap::Args;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::debug;

use crate::config::{
    self, ConfigSource, DEFAULT_BASE_URL, ENV_BASE_URL, ENV_CLIENT_ID, ENV_CLIENT_SECRET,
    ENV_DATA_CENTER, ENV_DC_TOKEN,
};
use crate::error::{ConfigError, CredentialField};

/// Authentication flags as given on the command line.
#[derive(Args, Debug, Clone, Default)]
pub struct AuthInputs {
    /// Cloud client ID [env: AGILETEST_CLIENT_ID]
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// Cloud client secret [env: AGILETEST_CLIENT_SECRET]
    #[arg(long, global = true)]
    pub client_secret: Option<String>,

    /// Use Data Center mode [env: AGILETEST_DATA_CENTER]
    #[arg(long, global = true)]
    pub data_center: bool,

    /// Data Center personal access token [env: AGILETEST_DC_TOKEN]
    #[arg(long, global = true)]
    pub data_center_token: Option<String>,

    /// API base URL, required in Data Center mode [env: AGILETEST_BASE_URL]
    #[arg(long, global = true)]
    pub base_url: Option<String>,
}

/// Which AgileTest deployment the credential targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Cloud,
    DataCenter,
}

/// The secret used to authorize requests. `Debug` redacts it.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    PersonalAccessToken {
        token: String,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Credential::PersonalAccessToken { .. } => f
                .debug_struct("PersonalAccessToken")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// A resolved credential plus the validated base URL it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    base_url: String,
    credential: Credential,
}

impl AuthContext {
    /// Cloud context. An absent or empty base URL means the public service.
    pub fn cloud(
        base_url: Option<&str>,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, ConfigError> {
        let base_url = match base_url.map(config::normalize_url).filter(|u| !u.is_empty()) {
            Some(url) => config::parse_url(ENV_BASE_URL, &url)?,
            None => DEFAULT_BASE_URL.to_owned(),
        };
        Ok(Self {
            base_url,
            credential: Credential::ClientCredentials {
                client_id: client_id.to_owned(),
                client_secret: client_secret.to_owned(),
            },
        })
    }

    /// Data Center context. The base URL must be a non-empty http(s) URL.
    pub fn data_center(base_url: &str, token: &str) -> Result<Self, ConfigError> {
        let base_url = config::normalize_url(base_url);
        if base_url.is_empty() {
            return Err(ConfigError::MissingCredential {
                field: CredentialField::BaseUrl,
            });
        }
        Ok(Self {
            base_url: config::parse_url(ENV_BASE_URL, &base_url)?,
            credential: Credential::PersonalAccessToken {
                token: token.to_owned(),
            },
        })
    }

    /// Derived from the credential variant.
    pub fn mode(&self) -> AuthMode {
        match self.credential {
            Credential::ClientCredentials { .. } => AuthMode::Cloud,
            Credential::PersonalAccessToken { .. } => AuthMode::DataCenter,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Resolves an [`AuthContext`] from flags, falling back to `source`.
pub fn resolve(inputs: &AuthInputs, source: &impl ConfigSource) -> Result<AuthContext, ConfigError> {
    let client_id = config::lookup(inputs.client_id.as_deref(), source, ENV_CLIENT_ID);
    let client_secret = config::lookup(inputs.client_secret.as_deref(), source, ENV_CLIENT_SECRET);
    let dc_token = config::lookup(inputs.data_center_token.as_deref(), source, ENV_DC_TOKEN);
    let base_url = config::lookup(inputs.base_url.as_deref(), source, ENV_BASE_URL);
    let explicit_dc = inputs.data_center || config::lookup_switch(source, ENV_DATA_CENTER);
    let has_cloud = client_id.is_some() && client_secret.is_some();

    let mode = if explicit_dc {
        if has_cloud {
            debug!("Data Center mode requested, ignoring Cloud client credentials");
        }
        AuthMode::DataCenter
    } else if dc_token.is_some() {
        if has_cloud {
            return Err(ConfigError::ConflictingMode);
        }
        AuthMode::DataCenter
    } else {
        AuthMode::Cloud
    };

    let missing = |field| ConfigError::MissingCredential { field };
    let ctx = match mode {
        AuthMode::DataCenter => {
            let token = dc_token.ok_or_else(|| missing(CredentialField::DataCenterToken))?;
            let base_url = base_url.ok_or_else(|| missing(CredentialField::BaseUrl))?;
            AuthContext::data_center(&base_url, &token)?
        }
        AuthMode::Cloud => {
            let client_id = client_id.ok_or_else(|| missing(CredentialField::ClientId))?;
            let client_secret = client_secret.ok_or_else(|| missing(CredentialField::ClientSecret))?;
            AuthContext::cloud(base_url.as_deref(), &client_id, &client_secret)?
        }
    };
    debug!(mode = ?ctx.mode(), base_url = ctx.base_url(), "Resolved credentials");
    Ok(ctx)
}

/// Whether `token` is a JWT whose `exp` claim lies in the future.
///
/// The signature is not checked; this only avoids a pointless token exchange.
pub fn token_is_fresh(token: &str) -> bool {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.leeway = 0;
    decode::<serde_json::Value>(token, &DecodingKey::from_secret(&[]), &validation).is_ok()
}
