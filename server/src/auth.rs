//! Authentication service
//!
//! Password hashing with bcrypt and stateless JWT bearer tokens.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::models::validation::{normalize_email, normalize_skills};
use crate::models::{
    AuthResponse, Claims, LoginRequest, NewUser, RegisterRequest, UpdatePasswordRequest, User,
};
use crate::store::{RepositoryError, UserRepository};

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Account is banned")]
    Banned,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DuplicateEmail => Self::EmailTaken,
            RepositoryError::NotFound => Self::UserNotFound,
            other => Self::Repository(other),
        }
    }
}

/// Authentication service
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    bcrypt_cost: u32,
    admin_emails: Vec<String>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, config: &Config) -> Self {
        Self {
            users,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl: Duration::hours(config.jwt_expiry_hours),
            bcrypt_cost: config.bcrypt_cost,
            admin_emails: config.admin_emails.clone(),
        }
    }

    /// Register a new account and sign it in
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        req.validate()?;

        let email = normalize_email(&req.email);
        let password_hash = self.hash_password(req.password).await?;
        let user = self
            .users
            .insert_user(NewUser {
                name: req.name.trim().to_string(),
                is_admin: self.admin_emails.contains(&email),
                email,
                password_hash,
                location: req.location.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
                skills_offered: normalize_skills(req.skills_offered),
                skills_wanted: normalize_skills(req.skills_wanted),
                availability: req.availability,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        let token = self.issue_token(user.id)?;
        Ok(AuthResponse { token, user })
    }

    /// Check credentials and issue a token
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        req.validate()?;

        let user = self
            .users
            .find_user_by_email(&normalize_email(&req.email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !self.verify_password(req.password, user.password_hash.clone()).await? {
            return Err(AuthError::InvalidCredentials);
        }
        if user.is_banned {
            return Err(AuthError::Banned);
        }

        self.users.touch_last_active(user.id).await?;
        let token = self.issue_token(user.id)?;
        Ok(AuthResponse { token, user })
    }

    /// The signed-in user's own record
    pub async fn me(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Change the password after checking the current one
    pub async fn update_password(
        &self,
        user_id: Uuid,
        req: UpdatePasswordRequest,
    ) -> Result<(), AuthError> {
        req.validate()?;

        let user = self.me(user_id).await?;
        if !self
            .verify_password(req.current_password, user.password_hash)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }
        let hash = self.hash_password(req.new_password).await?;
        self.users.update_password(user_id, hash).await?;
        tracing::info!(%user_id, "Password updated");
        Ok(())
    }

    pub fn issue_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp() as usize,
            exp: (now + self.token_ttl).timestamp() as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }

    async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let cost = self.bcrypt_cost;
        Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AuthError> {
        Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
    }
}
