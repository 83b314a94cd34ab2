use anyhow::Context;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::debug;

use super::claims::SessionClaims;
use crate::config::IdentityConfig;

/// Verification material for identity-provider session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    decoding: DecodingKey,
    validation: Validation,
}

impl SessionKeys {
    pub fn from_config(cfg: &IdentityConfig) -> anyhow::Result<Self> {
        let (decoding, algorithm) = match (&cfg.public_key_pem, &cfg.secret) {
            (Some(pem), _) => (
                DecodingKey::from_rsa_pem(pem.as_bytes()).context("parse IDP_JWT_PUBLIC_KEY")?,
                Algorithm::RS256,
            ),
            (None, Some(secret)) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            (None, None) => anyhow::bail!("no identity provider key configured"),
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = cfg.leeway_secs;
        if let Some(issuer) = &cfg.issuer {
            validation.set_issuer(std::slice::from_ref(issuer));
        }
        match &cfg.audience {
            Some(audience) => validation.set_audience(std::slice::from_ref(audience)),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            decoding,
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)?;
        if data.claims.sub.trim().is_empty() {
            anyhow::bail!("token has an empty subject");
        }
        debug!(subject_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}
