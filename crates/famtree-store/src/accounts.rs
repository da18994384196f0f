//! Accounts, profiles and sessions in SQLite.
//!
//! Passwords are stored as Argon2id PHC strings. Session tokens are random
//! 256-bit values handed to the client; only their SHA-256 digest is stored.

use crate::db::{backend, timestamp, Database};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use famtree_core::auth::{AuthError, Credentials, IdentityProvider, SessionGrant, SignUp};
use famtree_core::types::SessionContext;
use rusqlite::{params, ErrorCode, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const TOKEN_BYTES: usize = 32;

/// [`IdentityProvider`] backed by the `accounts`, `profiles` and `sessions`
/// tables.
#[derive(Clone)]
pub struct SqliteAccounts {
    db: Database,
}

impl SqliteAccounts {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn issue_session(&self, session: SessionContext) -> Result<SessionGrant, AuthError> {
        let token = new_token();
        let token_hash = hash_token(&token);
        let user_id = session.user_id.to_string();
        let created_at = timestamp(Utc::now());

        self.db
            .conn()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sessions (token_hash, user_id, created_at) VALUES (?1, ?2, ?3)",
                    params![token_hash, user_id, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(backend_auth)?;

        Ok(SessionGrant { token, session })
    }

    async fn create_profile(&self, user_id: Uuid, name: String) -> Result<(), tokio_rusqlite::Error> {
        self.db
            .conn()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO profiles (id, name) VALUES (?1, ?2)",
                    params![user_id.to_string(), name],
                )?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl IdentityProvider for SqliteAccounts {
    async fn sign_up(&self, request: &SignUp) -> Result<SessionGrant, AuthError> {
        request.validate()?;

        let email = request.normalized_email();
        let password = request.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))??;

        let user_id = Uuid::new_v4();
        let row_email = email.clone();
        let created_at = timestamp(Utc::now());
        let inserted = self
            .db
            .conn()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO accounts (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![user_id.to_string(), row_email, password_hash, created_at],
                )?;
                Ok(())
            })
            .await;

        match inserted {
            Ok(()) => {}
            Err(err) if is_constraint_violation(&err) => return Err(AuthError::EmailTaken),
            Err(err) => return Err(backend_auth(err)),
        }
        tracing::info!(user = %user_id, "account created");

        // The account stays usable without a profile row.
        if let Err(err) = self.create_profile(user_id, request.name.trim().to_string()).await {
            tracing::warn!(user = %user_id, error = %err, "profile creation skipped");
        }

        self.issue_session(SessionContext { user_id, email }).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<SessionGrant, AuthError> {
        credentials.validate()?;

        let email = credentials.normalized_email();
        let lookup_email = email.clone();
        let account = self
            .db
            .conn()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, password_hash FROM accounts WHERE email = ?1",
                        params![lookup_email],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(backend_auth)?;

        let Some((id, stored_hash)) = account else {
            tracing::info!("sign-in for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let password = credentials.password.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
            .await
            .map_err(|e| AuthError::Backend(e.to_string()))??;
        if !valid {
            tracing::info!(user = %id, "sign-in with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let user_id = Uuid::parse_str(&id).map_err(|e| AuthError::Backend(e.to_string()))?;
        tracing::info!(user = %user_id, "signed in");
        self.issue_session(SessionContext { user_id, email }).await
    }

    async fn resolve(&self, token: &str) -> Result<Option<SessionContext>, AuthError> {
        let token_hash = hash_token(token);
        let row = self
            .db
            .conn()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT a.id, a.email FROM sessions s
                         JOIN accounts a ON a.id = s.user_id
                         WHERE s.token_hash = ?1",
                        params![token_hash],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(backend_auth)?;

        row.map(|(id, email)| {
            Uuid::parse_str(&id)
                .map(|user_id| SessionContext { user_id, email })
                .map_err(|e| AuthError::Backend(e.to_string()))
        })
        .transpose()
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let token_hash = hash_token(token);
        let removed = self
            .db
            .conn()
            .call(move |conn| {
                let n = conn.execute("DELETE FROM sessions WHERE token_hash = ?1", params![token_hash])?;
                Ok(n)
            })
            .await
            .map_err(backend_auth)?;
        tracing::debug!(removed, "session revoked");
        Ok(())
    }
}

fn backend_auth(err: tokio_rusqlite::Error) -> AuthError {
    AuthError::Backend(backend(err).0)
}

fn is_constraint_violation(err: &tokio_rusqlite::Error) -> bool {
    matches!(
        err,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
    )
}

fn new_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Backend(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Backend(e.to_string()))
}

fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored).map_err(|e| AuthError::Backend(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
