//! Identity configuration loading and validation.
//!
//! The gateway can serve multiple named signing identities behind one
//! listener, selected by the inbound `Host` header. The YAML file is
//! loaded once at startup; there is no hot reload — identities carry
//! credentials and changing those under live traffic is a restart-worthy
//! event.

pub mod model;
pub mod validation;

use std::path::Path;

use model::IdentitySet;

use crate::error::GatewayError;

pub async fn load(path: &Path) -> Result<IdentitySet, GatewayError> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(GatewayError::ConfigFileNotFound {
            path: path.to_path_buf(),
        });
    }

    let raw = tokio::fs::read_to_string(path).await?;
    let set: IdentitySet =
        serde_yml::from_str(&raw).map_err(|e| GatewayError::ConfigParse {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

    validation::validate(&set).map_err(|errors| GatewayError::ConfigValidation { errors })?;
    Ok(set)
}
