//! Serde data structures for the identity configuration file.
//!
//! Contains [`IdentitySet`] (the root) and [`Identity`]. All types derive
//! `Serialize` and `Deserialize` with `deny_unknown_fields` for strict
//! parsing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One named signing identity: overrides applied to requests whose
/// inbound `Host` matches the map key exactly.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Identity {
    /// Service name to sign for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Region to sign for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Upstream host to proxy to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Role to assume before signing requests for this identity.
    #[serde(default, rename = "role-arn", skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
}

/// The config file root: host key → identity, with a mandatory `default`
/// entry used when no host matches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IdentitySet {
    pub identities: HashMap<String, Identity>,
}

impl IdentitySet {
    pub const DEFAULT_KEY: &'static str = "default";

    #[must_use]
    pub fn default_identity(&self) -> Option<&Identity> {
        self.identities.get(Self::DEFAULT_KEY)
    }

    /// All host-keyed identities, the default excluded.
    pub fn named(&self) -> impl Iterator<Item = (&String, &Identity)> {
        self.identities
            .iter()
            .filter(|(host, _)| host.as_str() != Self::DEFAULT_KEY)
    }
}
