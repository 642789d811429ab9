use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use uuid::Uuid;

use crate::error::{Result, VoteError};
use crate::models::{Account, UserIdentity};

pub const MIN_SECRET_LEN: usize = 6;

lazy_static! {
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid");
}

/// Storage for sign-up records. Emails are stored lowercased.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    async fn find_account(&self, email: &str) -> Result<Option<Account>>;

    /// Fails with [`VoteError::EmailInUse`] when the email is taken.
    async fn create_account(&self, account: &Account) -> Result<()>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, secret: &str) -> Result<UserIdentity>;

    /// Registers an account. Does not sign the new user in.
    async fn sign_up(&self, email: &str, secret: &str) -> Result<UserIdentity>;

    fn sign_out(&self);

    fn current_user(&self) -> Option<UserIdentity>;

    fn is_signed_in(&self) -> bool {
        self.current_user().is_some()
    }
}

/// Email + secret authentication over an [`AccountStore`].
pub struct LocalAuth<A: AccountStore> {
    accounts: Arc<A>,
    current: RwLock<Option<UserIdentity>>,
}

impl<A: AccountStore> LocalAuth<A> {
    pub fn new(accounts: Arc<A>) -> Self {
        Self {
            accounts,
            current: RwLock::new(None),
        }
    }

    fn set_current(&self, user: Option<UserIdentity>) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = user;
    }
}

fn normalize(email: &str, secret: &str) -> Result<String> {
    let email = email.trim();
    if email.is_empty() || secret.is_empty() {
        return Err(VoteError::MissingCredentials);
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err(VoteError::InvalidEmail(email.to_string()));
    }
    Ok(email.to_lowercase())
}

fn digest(secret: &str, salt: &str) -> String {
    hex::encode(hmac_sha256::HMAC::mac(secret.as_bytes(), salt.as_bytes()))
}

#[async_trait]
impl<A: AccountStore> AuthProvider for LocalAuth<A> {
    async fn sign_in(&self, email: &str, secret: &str) -> Result<UserIdentity> {
        let email = normalize(email, secret)?;

        let Some(account) = self.accounts.find_account(&email).await? else {
            warn!("Sign-in attempt for unknown account");
            return Err(VoteError::InvalidCredentials);
        };
        if digest(secret, &account.salt) != account.secret_digest {
            warn!("Sign-in attempt with wrong secret for {}", account.uid);
            return Err(VoteError::InvalidCredentials);
        }

        let user = UserIdentity::from(&account);
        info!("User {} signed in", user.uid);
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(&self, email: &str, secret: &str) -> Result<UserIdentity> {
        let email = normalize(email, secret)?;
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(VoteError::WeakSecret {
                min: MIN_SECRET_LEN,
            });
        }

        let salt = Uuid::new_v4().to_string();
        let account = Account {
            uid: Uuid::new_v4().to_string(),
            secret_digest: digest(secret, &salt),
            salt,
            email,
            created_at: Utc::now(),
        };
        self.accounts.create_account(&account).await?;

        info!("Created account {}", account.uid);
        Ok(UserIdentity::from(&account))
    }

    fn sign_out(&self) {
        if let Some(user) = self.current_user() {
            info!("User {} signed out", user.uid);
        }
        self.set_current(None);
    }

    fn current_user(&self) -> Option<UserIdentity> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
