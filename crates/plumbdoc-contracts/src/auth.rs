//! Login gate for the document front end.
//!
//! This only keeps casual users out of the UI. It is not a security
//! boundary: the allow-list lives in the same store as the documents.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::store::LocalStore;

pub const CREDENTIALS_KEY: &str = "plumbdoc_credentials";
pub const REMEMBERED_EMAIL_KEY: &str = "plumbdoc_remembered_email";
pub const SESSION_KEY: &str = "plumbdoc_session_active";

#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
    pub keep_session: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialGate {
    digests: BTreeSet<String>,
}

impl CredentialGate {
    pub fn new(digests: impl IntoIterator<Item = String>) -> Self {
        Self {
            digests: digests.into_iter().collect(),
        }
    }

    pub fn load(store: &LocalStore) -> anyhow::Result<Self> {
        let digests: Vec<String> = store.read_json(CREDENTIALS_KEY)?.unwrap_or_default();
        Ok(Self::new(digests))
    }

    /// Adds a credential pair to the stored allow-list. Returns `false` when
    /// the pair was already present.
    pub fn register(store: &LocalStore, email: &str, password: &str) -> anyhow::Result<bool> {
        if email.trim().is_empty() || password.is_empty() {
            anyhow::bail!("email and password must not be empty");
        }
        let mut gate = Self::load(store)?;
        if !gate.digests.insert(credential_digest(email, password)) {
            return Ok(false);
        }
        let digests = gate.digests.iter().collect::<Vec<_>>();
        store.write_json(CREDENTIALS_KEY, &digests)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn verify(&self, email: &str, password: &str) -> bool {
        self.digests.contains(&credential_digest(email, password))
    }

    pub fn login(
        &self,
        store: &LocalStore,
        request: &LoginRequest,
    ) -> anyhow::Result<LoginOutcome> {
        if !self.verify(&request.email, &request.password) {
            tracing::info!("login denied");
            return Ok(LoginOutcome::Denied);
        }

        if request.remember_me {
            store.write_json(REMEMBERED_EMAIL_KEY, request.email.trim())?;
        } else {
            store.remove(REMEMBERED_EMAIL_KEY)?;
        }
        if request.keep_session {
            store.write_json(SESSION_KEY, &true)?;
        } else {
            store.remove(SESSION_KEY)?;
        }
        Ok(LoginOutcome::Granted)
    }
}

pub fn logout(store: &LocalStore) -> anyhow::Result<()> {
    store.remove(SESSION_KEY)?;
    Ok(())
}

pub fn remembered_email(store: &LocalStore) -> anyhow::Result<Option<String>> {
    Ok(store.read_json(REMEMBERED_EMAIL_KEY)?)
}

pub fn session_active(store: &LocalStore) -> anyhow::Result<bool> {
    Ok(store.read_json::<bool>(SESSION_KEY)?.unwrap_or(false))
}

/// Hex SHA-256 over the normalized e-mail and the password.
pub fn credential_digest(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_ascii_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str, remember_me: bool, keep_session: bool) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
            remember_me,
            keep_session,
        }
    }

    #[test]
    fn digest_normalizes_email_but_not_password() {
        assert_eq!(
            credential_digest(" Geral@Empresa.pt ", "segredo"),
            credential_digest("geral@empresa.pt", "segredo")
        );
        assert_ne!(
            credential_digest("geral@empresa.pt", "segredo"),
            credential_digest("geral@empresa.pt", "Segredo")
        );
        assert_eq!(credential_digest("a@b.c", "x").len(), 64);
    }

    #[test]
    fn register_then_login_persists_flags() -> anyhow::Result<()> {
        let store = LocalStore::in_memory();
        assert!(CredentialGate::register(&store, "geral@empresa.pt", "segredo")?);
        assert!(!CredentialGate::register(&store, "GERAL@empresa.pt", "segredo")?);

        let gate = CredentialGate::load(&store)?;
        assert_eq!(gate.len(), 1);
        let outcome = gate.login(&store, &request("geral@empresa.pt", "segredo", true, true))?;
        assert_eq!(outcome, LoginOutcome::Granted);
        assert_eq!(remembered_email(&store)?.as_deref(), Some("geral@empresa.pt"));
        assert!(session_active(&store)?);

        logout(&store)?;
        assert!(!session_active(&store)?);
        assert_eq!(remembered_email(&store)?.as_deref(), Some("geral@empresa.pt"));
        Ok(())
    }

    #[test]
    fn login_without_flags_clears_previous_ones() -> anyhow::Result<()> {
        let store = LocalStore::in_memory();
        CredentialGate::register(&store, "tec@empresa.pt", "abc123")?;
        let gate = CredentialGate::load(&store)?;
        gate.login(&store, &request("tec@empresa.pt", "abc123", true, true))?;
        gate.login(&store, &request("tec@empresa.pt", "abc123", false, false))?;
        assert_eq!(remembered_email(&store)?, None);
        assert!(!session_active(&store)?);
        Ok(())
    }

    #[test]
    fn wrong_password_is_denied_without_side_effects() -> anyhow::Result<()> {
        let store = LocalStore::in_memory();
        CredentialGate::register(&store, "tec@empresa.pt", "abc123")?;
        let gate = CredentialGate::load(&store)?;
        let outcome = gate.login(&store, &request("tec@empresa.pt", "nope", true, true))?;
        assert_eq!(outcome, LoginOutcome::Denied);
        assert!(!session_active(&store)?);
        assert_eq!(remembered_email(&store)?, None);
        Ok(())
    }

    #[test]
    fn register_rejects_blank_credentials() {
        let store = LocalStore::in_memory();
        assert!(CredentialGate::register(&store, "  ", "x").is_err());
        assert!(CredentialGate::register(&store, "a@b.c", "").is_err());
    }
}
