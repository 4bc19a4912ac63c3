use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use once_cell::sync::Lazy;
use tracing::{info, warn};

use quill_db::Database;
use quill_db::models::UserRow;
use quill_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest};
use quill_types::models::{AccountUser, Role};

use crate::error::ApiError;
use crate::middleware::{bearer_token, decode_token};
use crate::state::{AppState, run_db};

const MIN_PASSWORD_LEN: usize = 6;

/// Verified against when no account matches the email, so an unknown email
/// costs the same Argon2 run as a wrong password.
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("quill-no-such-account").ok());

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    validate_email(&email)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }

    let role = resolve_role(req.role.as_deref());
    if role == Role::Admin {
        // Only an existing admin may mint another one.
        let caller = bearer_token(&headers)
            .and_then(|token| decode_token(&state.jwt_secret, token).ok());
        if !caller.is_some_and(|claims| claims.role == Role::Admin) {
            return Err(ApiError::forbidden(
                "Only an administrator can assign the admin role",
            ));
        }
    }

    let password = req.password;
    let created = run_db(&state, move |db| {
        if db.get_user_by_email(&email)?.is_some() {
            return Ok(None);
        }
        let password_hash = hash_password(&password)?;
        db.create_user(&email, &password_hash, &name, role)
    })
    .await?
    .ok_or_else(|| ApiError::conflict("Email already registered"))?;

    info!(user_id = created.id, role = %created.role, "user registered");

    Ok((StatusCode::CREATED, Json(account_user(created))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    let password = req.password;

    // Unknown email and wrong password are indistinguishable to the caller.
    let user = run_db(&state, move |db| {
        let Some(user) = db.get_user_by_email(&email)? else {
            verify_dummy(&password);
            return Ok(None);
        };
        Ok(verify_password(&password, &user.password)?.then_some(user))
    })
    .await?
    .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let access_token = create_token(&state.jwt_secret, state.token_ttl, &user)?;

    Ok(Json(LoginResponse {
        access_token,
        user: account_user(user),
    }))
}

/// Seed the provisioning admin account if no account uses `email` yet.
/// An existing account is left untouched, whatever its role.
pub fn ensure_admin(db: &Database, email: &str, password: &str, name: &str) -> anyhow::Result<()> {
    let email = normalize_email(email);
    if let Some(existing) = db.get_user_by_email(&email)? {
        if existing.role != Role::Admin {
            warn!(user_id = existing.id, "bootstrap admin email belongs to a non-admin account");
        }
        return Ok(());
    }

    let password_hash = hash_password(password)?;
    if let Some(user) = db.create_user(&email, &password_hash, name, Role::Admin)? {
        info!(user_id = user.id, "bootstrap admin account created");
    }
    Ok(())
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// `Ok(false)` on a mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("stored password hash is malformed: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn verify_dummy(password: &str) {
    if let Some(dummy) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, dummy);
    }
}

pub fn create_token(secret: &str, ttl: chrono::Duration, user: &UserRow) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        role: user.role,
        email: user.email.clone(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// A known role name is honoured; anything else, or nothing, means reader.
pub fn resolve_role(requested: Option<&str>) -> Role {
    requested
        .and_then(|r| r.parse::<Role>().ok())
        .unwrap_or_default()
}

fn account_user(row: UserRow) -> AccountUser {
    AccountUser {
        id: row.id,
        email: row.email,
        name: row.name,
        role: row.role,
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::validation("email must be a valid email address");
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let well_formed = !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !domain.ends_with('.');
    if well_formed { Ok(()) } else { Err(invalid()) }
}
