//! Local account store: sign-up, login, logout, password change and the
//! current session.
//!
//! Passwords are Argon2id PHC strings. The active session lives in the
//! settings table under a fixed key and expires a fixed time after issuance.

use crate::models::{Session, SessionUser};
use crate::session::SessionProvider;
use crate::storage::{StorageManager, UserRecord, SESSION_KEY};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 6;

pub fn default_session_duration() -> Duration {
    Duration::days(7)
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),

    #[error("An account with this email already exists")]
    EmailTaken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Current password is incorrect")]
    WrongPassword,

    #[error("User not found")]
    UserNotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<bool, AccountError> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("Stored password hash is invalid: {}", e))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Failed to verify password: {}", e).into()),
    }
}

fn validate_password_strength(password: &str) -> Result<(), AccountError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AccountError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct AccountStore {
    storage: StorageManager,
    session_duration: Duration,
}

impl AccountStore {
    pub fn new(storage: StorageManager) -> Self {
        Self {
            storage,
            session_duration: default_session_duration(),
        }
    }

    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    /// Creates the account and signs it in.
    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<Session, AccountError> {
        let email = normalize_email(email);
        let name = name.trim();
        if email.is_empty() || name.is_empty() {
            return Err(AccountError::Validation(
                "Email, password, and name are required".to_string(),
            ));
        }
        validate_password_strength(password)?;

        if self.storage.find_user_by_email(&email).await?.is_some() {
            log::warn!("Sign-up rejected, email already registered: {}", email);
            return Err(AccountError::EmailTaken);
        }

        let user = UserRecord {
            id: Uuid::new_v4(),
            email,
            name: name.to_string(),
            password_hash: hash_password(password)?,
            created_at: Utc::now(),
        };
        // A concurrent sign-up can win between the lookup above and this insert
        if !self.storage.insert_user(&user).await? {
            return Err(AccountError::EmailTaken);
        }
        self.create_session(&user).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AccountError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AccountError::Validation(
                "Email and password are required".to_string(),
            ));
        }
        let Some(user) = self.storage.find_user_by_email(&email).await? else {
            log::warn!("Login failed for unknown email: {}", email);
            return Err(AccountError::InvalidCredentials);
        };
        if !verify_password(password, &user.password_hash)? {
            log::warn!("Login failed for {}: wrong password", email);
            return Err(AccountError::InvalidCredentials);
        }
        self.create_session(&user).await
    }

    pub async fn logout(&self) -> Result<(), AccountError> {
        log::info!("Signing out");
        self.storage.delete_setting(SESSION_KEY).await?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AccountError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(AccountError::Validation(
                "Current password and new password are required".to_string(),
            ));
        }
        validate_password_strength(new_password)?;

        let email = normalize_email(email);
        let Some(user) = self.storage.find_user_by_email(&email).await? else {
            return Err(AccountError::UserNotFound);
        };
        if !verify_password(current_password, &user.password_hash)? {
            return Err(AccountError::WrongPassword);
        }
        self.storage
            .update_password_hash(user.id, &hash_password(new_password)?)
            .await?;
        log::info!("Password changed for {}", email);
        Ok(())
    }

    /// The stored session if it has not expired. An expired one is removed.
    pub async fn current_session(&self) -> anyhow::Result<Option<Session>> {
        let Some(session) = self.storage.get_setting::<Session>(SESSION_KEY).await? else {
            return Ok(None);
        };
        if session.is_expired_at(Utc::now()) {
            log::info!("Session for {} expired at {}", session.user.email, session.expires_at);
            self.storage.delete_setting(SESSION_KEY).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub async fn current_user(&self) -> anyhow::Result<Option<SessionUser>> {
        Ok(self.current_session().await?.map(|session| session.user))
    }

    async fn create_session(&self, user: &UserRecord) -> Result<Session, AccountError> {
        let session = Session {
            user: SessionUser {
                id: user.id,
                email: user.email.clone(),
                name: user.name.clone(),
            },
            expires_at: Utc::now() + self.session_duration,
        };
        self.storage.set_setting(SESSION_KEY, &session).await?;
        log::info!("Signed in as {} until {}", user.email, session.expires_at);
        Ok(session)
    }
}

#[async_trait]
impl SessionProvider for AccountStore {
    async fn current_session(&self) -> anyhow::Result<Option<Session>> {
        AccountStore::current_session(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn accounts() -> anyhow::Result<(tempfile::TempDir, AccountStore)> {
        let temp = tempfile::tempdir()?;
        let storage = StorageManager::new(&temp.path().join("accounts.sqlite")).await?;
        Ok((temp, AccountStore::new(storage)))
    }

    #[tokio::test]
    async fn sign_up_signs_in() -> anyhow::Result<()> {
        let (_temp, accounts) = accounts().await?;
        let session = accounts.sign_up(" Ada@Example.com ", "lovelace", "Ada").await?;
        assert_eq!(session.user.email, "ada@example.com");

        let current = accounts.current_user().await?.expect("signed in");
        assert_eq!(current.name, "Ada");

        accounts.logout().await?;
        assert!(accounts.current_session().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn sign_up_validation() -> anyhow::Result<()> {
        let (_temp, accounts) = accounts().await?;
        assert!(matches!(
            accounts.sign_up("ada@example.com", "short", "Ada").await,
            Err(AccountError::Validation(_))
        ));
        assert!(matches!(
            accounts.sign_up("", "lovelace", "Ada").await,
            Err(AccountError::Validation(_))
        ));

        accounts.sign_up("ada@example.com", "lovelace", "Ada").await?;
        assert!(matches!(
            accounts.sign_up("ADA@example.com", "another1", "Ada 2").await,
            Err(AccountError::EmailTaken)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_sign_ups_with_one_email() -> anyhow::Result<()> {
        let (_temp, accounts) = accounts().await?;
        let (first, second) = tokio::join!(
            accounts.sign_up("ada@example.com", "lovelace", "Ada"),
            accounts.sign_up("Ada@Example.com", "engines1", "Ada"),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AccountError::EmailTaken))));
        Ok(())
    }

    #[tokio::test]
    async fn login_checks_password() -> anyhow::Result<()> {
        let (_temp, accounts) = accounts().await?;
        accounts.sign_up("ada@example.com", "lovelace", "Ada").await?;
        accounts.logout().await?;

        assert!(matches!(
            accounts.login("ada@example.com", "babbage").await,
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            accounts.login("nobody@example.com", "lovelace").await,
            Err(AccountError::InvalidCredentials)
        ));
        assert!(accounts.current_session().await?.is_none());

        let session = accounts.login("ada@example.com", "lovelace").await?;
        let remaining = session.expires_at - Utc::now();
        assert!(remaining > Duration::days(6) && remaining <= Duration::days(7));
        Ok(())
    }

    #[tokio::test]
    async fn expired_session_is_cleared() -> anyhow::Result<()> {
        let (_temp, accounts) = accounts().await?;
        let accounts = accounts.with_session_duration(Duration::seconds(-1));
        accounts.sign_up("ada@example.com", "lovelace", "Ada").await?;

        assert!(accounts.current_session().await?.is_none());
        // Removed from storage, not just filtered
        assert!(accounts
            .storage
            .get_setting::<Session>(SESSION_KEY)
            .await?
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn change_password_flow() -> anyhow::Result<()> {
        let (_temp, accounts) = accounts().await?;
        accounts.sign_up("ada@example.com", "lovelace", "Ada").await?;

        assert!(matches!(
            accounts.change_password("ada@example.com", "wrong!", "engines").await,
            Err(AccountError::WrongPassword)
        ));
        assert!(matches!(
            accounts.change_password("ada@example.com", "lovelace", "tiny").await,
            Err(AccountError::Validation(_))
        ));
        assert!(matches!(
            accounts.change_password("bob@example.com", "lovelace", "engines").await,
            Err(AccountError::UserNotFound)
        ));

        accounts.change_password("ada@example.com", "lovelace", "engines").await?;
        accounts.logout().await?;
        assert!(accounts.login("ada@example.com", "lovelace").await.is_err());
        accounts.login("ada@example.com", "engines").await?;
        Ok(())
    }
}
