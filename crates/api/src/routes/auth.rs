//! Authentication routes

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use tandem_shared::{NewUser, UserId, UserProfile};

use crate::{
    auth::{hash_password, validate_password, verify_password, AuthUser, TokenPair},
    error::{ApiError, ApiResult, FieldErrors},
    state::AppState,
};

const MAX_USERNAME_LENGTH: usize = 150;
const MAX_NAME_LENGTH: usize = 150;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Every field is optional on the wire so that missing fields are reported
/// per field instead of as a rejected body.
#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameAvailabilityRequest {
    pub username: String,
}

/// Public part of a freshly created account
#[derive(Debug, Serialize)]
pub struct SignupPayload {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub payload: SignupPayload,
    pub access: String,
    pub refresh: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub access: String,
    pub refresh: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailabilityResponse {
    pub user_available: bool,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub payload: UserProfile,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an account and sign it in
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    if !state.config.enable_signup {
        return Err(ApiError::BadRequest(
            "Registration is currently disabled".to_string(),
        ));
    }

    let new_user = validate_signup(req)?;
    let password_hash = hash_password(&new_user.password_hash).map_err(|e| {
        tracing::error!(error = %e, "signup: password hashing failed");
        ApiError::Internal
    })?;

    let profile = state
        .store
        .create_user(NewUser {
            password_hash,
            ..new_user
        })
        .await
        .map_err(|e| {
            if e.is_conflict() {
                ApiError::field("username", "A user with that username already exists.")
            } else {
                e.into()
            }
        })?;

    let tokens = issue_tokens(&state, &profile)?;
    tracing::info!(user_id = %profile.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            payload: SignupPayload {
                username: profile.username,
                email: profile.email,
                first_name: profile.first_name,
                last_name: profile.last_name,
            },
            access: tokens.access,
            refresh: tokens.refresh,
            message: "Registration successful".to_string(),
        }),
    ))
}

/// Exchange credentials for a token pair
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let (profile, password_hash) = state
        .store
        .credentials(req.username.trim())
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let valid = verify_password(&req.password, &password_hash).map_err(|e| {
        tracing::error!(user_id = %profile.id, error = %e, "login: stored hash is unreadable");
        ApiError::Internal
    })?;
    if !valid {
        tracing::info!(user_id = %profile.id, "login: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let tokens = issue_tokens(&state, &profile)?;

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        access: tokens.access,
        refresh: tokens.refresh,
        user: profile,
    }))
}

/// Trade a refresh token for a new pair
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = state
        .jwt
        .validate_refresh_token(&req.refresh)
        .map_err(|_| ApiError::InvalidToken)?;

    let identity = state
        .store
        .find_by_id(UserId(claims.sub))
        .await?
        .ok_or(ApiError::InvalidToken)?;

    let tokens = state.jwt.generate_token_pair(&identity).map_err(|e| {
        tracing::error!(error = %e, "refresh: token generation failed");
        ApiError::Internal
    })?;

    Ok(Json(tokens))
}

pub async fn username_availability(
    State(state): State<AppState>,
    Json(req): Json<UsernameAvailabilityRequest>,
) -> ApiResult<Json<UsernameAvailabilityResponse>> {
    let taken = state
        .store
        .find_by_username(req.username.trim())
        .await?
        .is_some();

    Ok(Json(UsernameAvailabilityResponse {
        user_available: !taken,
    }))
}

/// Current user's profile
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<MeResponse>> {
    let profile = state
        .store
        .profile(auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(MeResponse { payload: profile }))
}

// =============================================================================
// Helper Functions
// =============================================================================

fn issue_tokens(state: &AppState, profile: &UserProfile) -> ApiResult<TokenPair> {
    state
        .jwt
        .generate_token_pair(&profile.identity())
        .map_err(|e| {
            tracing::error!(user_id = %profile.id, error = %e, "Token generation failed");
            ApiError::Internal
        })
}

/// Check every signup field and collect all problems at once.
///
/// On success the returned `password_hash` still holds the plain password.
fn validate_signup(req: SignupRequest) -> Result<NewUser, ApiError> {
    let mut errors = FieldErrors::new();
    let mut require = |field: &str, value: Option<String>| -> String {
        match value {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => {
                errors
                    .entry(field.to_string())
                    .or_default()
                    .push(format!("{field} is required"));
                String::new()
            }
        }
    };

    let username = require("username", req.username);
    let email = require("email", req.email);
    let first_name = require("first_name", req.first_name);
    let last_name = require("last_name", req.last_name);
    let password = match req.password {
        Some(p) if !p.is_empty() => p,
        _ => {
            errors
                .entry("password".to_string())
                .or_default()
                .push("password is required".to_string());
            String::new()
        }
    };

    let mut invalid = |field: &str, message: String| {
        errors.entry(field.to_string()).or_default().push(message);
    };

    if !username.is_empty() && !is_valid_username(&username) {
        invalid(
            "username",
            format!(
                "Enter a valid username of at most {MAX_USERNAME_LENGTH} characters: letters, digits and @/./+/-/_ only."
            ),
        );
    }
    if !email.is_empty() && !is_valid_email(&email) {
        invalid("email", "Enter a valid email address.".to_string());
    }
    if !password.is_empty() {
        if let Err(e) = validate_password(&password) {
            invalid("password", e.to_string());
        }
    }
    for (field, value) in [("first_name", &first_name), ("last_name", &last_name)] {
        if value.chars().count() > MAX_NAME_LENGTH {
            invalid(
                field,
                format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters."),
            );
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::InvalidFields(errors));
    }

    Ok(NewUser {
        username,
        email: email.to_lowercase(),
        password_hash: password,
        first_name,
        last_name,
    })
}

fn is_valid_username(username: &str) -> bool {
    username.chars().count() <= MAX_USERNAME_LENGTH
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
}

fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    let local_ok = !local.is_empty()
        && local.len() <= 64
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && local.chars().all(|c| c.is_alphanumeric() || ".+-_".contains(c));

    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
        && labels
            .last()
            .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_alphabetic()));

    local_ok && domain_ok
}
