//! crates/dumpster_core/src/identity.rs
//!
//! Turns presented credentials into an `Identity`.
//!
//! Common users are accepted on their self-reported name and email. Organizations
//! must match an entry of the directory supplied at startup.

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::domain::{Credentials, Identity, Role};
use crate::ports::{PortError, PortResult};

/// Organization email → secret, fixed at startup.
///
/// A secret starting with `$argon2` is treated as a PHC hash string, anything
/// else as a plaintext password.
#[derive(Debug, Clone, Default)]
pub struct OrganizationDirectory {
    entries: HashMap<String, String>,
}

impl OrganizationDirectory {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks `password` against the stored secret for `email`.
    pub fn verify(&self, email: &str, password: &str) -> bool {
        let Some(stored) = self.entries.get(email) else {
            return false;
        };

        if stored.starts_with("$argon2") {
            return match PasswordHash::new(stored) {
                Ok(parsed) => Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok(),
                Err(e) => {
                    tracing::warn!(email, "unparseable argon2 hash in organization directory: {e}");
                    false
                }
            };
        }

        constant_time_eq(
            Sha256::digest(stored.as_bytes()).as_slice(),
            Sha256::digest(password.as_bytes()).as_slice(),
        )
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Logs an actor in, producing the identity that later calls are made with.
pub fn authenticate(
    directory: &OrganizationDirectory,
    credentials: Credentials,
) -> PortResult<Identity> {
    match credentials {
        Credentials::CommonUser { name, email } => {
            let name = name.trim();
            let email = email.trim();
            if name.is_empty() || email.is_empty() {
                return Err(PortError::InvalidInput(
                    "Please enter both name and email.".to_string(),
                ));
            }
            Ok(Identity {
                role: Role::CommonUser,
                email: email.to_string(),
                display_name: Some(name.to_string()),
            })
        }
        Credentials::Organization { email, password } => {
            let email = email.trim();
            if !directory.verify(email, &password) {
                return Err(PortError::InvalidCredentials);
            }
            Ok(Identity {
                role: Role::Organization,
                email: email.to_string(),
                display_name: None,
            })
        }
    }
}

impl Identity {
    /// Fails with `Unauthorized` unless this identity plays `role`.
    pub fn require(&self, role: Role) -> PortResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(PortError::Unauthorized)
        }
    }
}
