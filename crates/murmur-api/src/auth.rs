use std::sync::{Arc, OnceLock};
use std::time::Duration;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use murmur_db::Database;
use murmur_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use murmur_types::models::Role;

use crate::calls::db_call;
use crate::error::ServiceError;
use crate::state::AppState;

/// Capability tokens expire a day after issue.
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const MAX_HANDLE_LEN: usize = 64;

/// Identity established by a successful login or registration.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub handle: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub token: String,
}

/// Credential checks and capability token issue/verification.
pub struct Authenticator {
    db: Arc<Database>,
    jwt_secret: String,
    call_timeout: Duration,
}

impl Authenticator {
    pub fn new(db: Arc<Database>, jwt_secret: String, call_timeout: Duration) -> Self {
        Self {
            db,
            jwt_secret,
            call_timeout,
        }
    }

    /// Check `password` against the stored hash for `handle`.
    ///
    /// An unknown handle and a wrong password fail identically.
    pub async fn authenticate(&self, handle: &str, password: &str) -> Result<Session, ServiceError> {
        let lookup = handle.to_string();
        let user = db_call(&self.db, self.call_timeout, move |db| db.get_user_by_username(&lookup))
            .await
            .map_err(|e| e.into_service_error("user lookup failed"))?;

        // Unknown handles still pay for a full verify, against a throwaway hash.
        let stored_hash = user.as_ref().map(|u| u.password.clone());
        let candidate = password.to_string();
        let verified = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => verify_password(&candidate, &hash),
            None => {
                if let Some(dummy) = dummy_hash() {
                    verify_password(&candidate, dummy);
                }
                false
            }
        })
        .await
        .map_err(|e| ServiceError::storage("spawn_blocking join error", e))?;
        let user = match user {
            Some(user) if verified => user,
            _ => return Err(ServiceError::InvalidCredentials),
        };

        let role = user
            .role()
            .map_err(|e| ServiceError::storage("corrupt user row", e))?;
        let user_id: Uuid = user
            .id
            .parse()
            .map_err(|e| ServiceError::storage("corrupt user id", e))?;
        let token = self.issue_token(user_id, &user.username, role)?;

        Ok(Session {
            user_id,
            handle: user.username,
            display_name: user.display_name,
            role,
            token,
        })
    }

    /// Create an ordinary user. Registration never produces moderators.
    pub async fn register(
        &self,
        display_name: Option<&str>,
        handle: &str,
        password: &str,
    ) -> Result<Session, ServiceError> {
        if handle.is_empty() || password.is_empty() {
            return Err(ServiceError::bad_input("Missing required fields"));
        }
        if handle.len() > MAX_HANDLE_LEN {
            return Err(ServiceError::bad_input("Handle is too long"));
        }
        // Login matches handles exactly, so stray whitespace would lock the
        // account out.
        if handle.trim() != handle {
            return Err(ServiceError::bad_input(
                "Handle cannot start or end with whitespace",
            ));
        }

        let user_id = self.create_user(display_name, handle, password, Role::User).await?;
        let token = self.issue_token(user_id, handle, Role::User)?;
        info!("Registered user {}", handle);

        Ok(Session {
            user_id,
            handle: handle.to_string(),
            display_name: display_name.map(str::to_owned),
            role: Role::User,
            token,
        })
    }

    /// Create a moderator at bootstrap unless the handle already exists.
    /// Returns true if a new account was created.
    pub async fn seed_moderator(&self, handle: &str, password: &str) -> Result<bool, ServiceError> {
        match self.create_user(None, handle, password, Role::Moderator).await {
            Ok(_) => {
                info!("Seeded moderator {}", handle);
                Ok(true)
            }
            Err(ServiceError::DuplicateHandle) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_user(
        &self,
        display_name: Option<&str>,
        handle: &str,
        password: &str,
        role: Role,
    ) -> Result<Uuid, ServiceError> {
        let raw = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&raw))
            .await
            .map_err(|e| ServiceError::storage("spawn_blocking join error", e))?
            .map_err(|e| ServiceError::storage("password hashing failed", e))?;

        let user_id = Uuid::new_v4();
        let id = user_id.to_string();
        let username = handle.to_string();
        let display_name = display_name.map(str::to_owned);
        let inserted = db_call(&self.db, self.call_timeout, move |db| {
            db.create_user(&id, &username, display_name.as_deref(), &password_hash, role.as_str())
        })
        .await
        .map_err(|e| e.into_service_error("user insert failed"))?;

        if !inserted {
            return Err(ServiceError::DuplicateHandle);
        }
        Ok(user_id)
    }

    pub fn issue_token(&self, user_id: Uuid, handle: &str, role: Role) -> Result<String, ServiceError> {
        let claims = Claims {
            sub: user_id,
            username: handle.to_string(),
            role,
            exp: (chrono::Utc::now().timestamp() + TOKEN_TTL.as_secs() as i64) as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::storage("token encoding failed", e))
    }

    /// Decode and validate a capability token, including its expiry.
    pub fn verify_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| ServiceError::Unauthorized)
    }
}

/// Per-call role gate for moderator-only operations.
pub fn require_moderator(claims: &Claims) -> Result<(), ServiceError> {
    if claims.role.is_moderator() {
        Ok(())
    } else {
        warn!("User {} attempted a moderator-only operation", claims.username);
        Err(ServiceError::Forbidden)
    }
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    // Argon2id with a fresh random salt
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(hash.to_string())
}

/// Argon2 hash of a fixed string, with the same parameters as real hashes.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("murmur-unknown-handle").ok())
        .as_deref()
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        warn!("Unparseable password hash in users table");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// -- Handlers --

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = body?;
    let (Some(handle), Some(password)) = (req.handle.as_deref(), req.password.as_deref()) else {
        return Err(ServiceError::bad_input("Missing required fields"));
    };
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let session = state.auth.register(name, handle, password).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            token: session.token,
            role: session.role,
            name: session.display_name.unwrap_or(session.handle),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    // A body without usable credentials is just a failed login.
    let Ok(Json(req)) = body else {
        return Err(ServiceError::InvalidCredentials);
    };
    let session = state.auth.authenticate(&req.handle, &req.password).await?;
    info!("{} logged in as {}", session.handle, session.role);

    Ok(Json(LoginResponse {
        token: session.token,
        role: session.role,
        handle: session.handle,
    }))
}
