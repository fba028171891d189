use crate::application::account_service::AccountService;
use crate::data::user_repository::InMemoryUserRepository;
use crate::domain::error::DomainError;
use crate::domain::user::{Auth, LoginRequest, NewUser, PointAward, Registration, TokenRequest, User};
use crate::infrastructure::point_client::HttpPointGateway;
use actix_web::http::StatusCode;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

pub type Accounts = AccountService<InMemoryUserRepository, HttpPointGateway>;

pub struct AppState {
    pub accounts: Accounts,
}

/// Registers every route under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health_check))
            .route("/users", web::get().to(list_users))
            .route("/users", web::post().to(create_user))
            .route("/users/{id}", web::get().to(get_user))
            .route("/users/{id}", web::put().to(update_user))
            .route("/users/{id}", web::delete().to(delete_user))
            .route("/auth/login", web::post().to(login))
            .route("/auth/token", web::post().to(token_auth))
            .route("/demo", web::post().to(create_demo_data)),
    );
}

// Uniform error response format
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    details: serde_json::Value,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad gateway: {0}")]
    BadGateway(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_msg = self.to_string();

        if status.is_server_error() {
            error!(error = %error_msg, status = %status, "Request failed");
        } else {
            warn!(error = %error_msg, status = %status, "Request rejected");
        }

        HttpResponse::build(status).json(ErrorResponse {
            details: serde_json::json!({ "message": self.message() }),
            error: error_msg,
        })
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<DomainError>() {
            Some(DomainError::NotFound(msg)) => ApiError::NotFound(msg.clone()),
            Some(DomainError::InvalidId(raw)) => {
                ApiError::BadRequest(format!("invalid user id: {:?}", raw))
            }
            Some(DomainError::Conflict(msg)) => ApiError::Conflict(msg.clone()),
            Some(DomainError::InvalidCredentials) => {
                ApiError::Unauthorized("Invalid email or password".to_string())
            }
            Some(DomainError::InvalidToken(msg)) => ApiError::Unauthorized(msg.clone()),
            Some(DomainError::Upstream(msg)) => ApiError::BadGateway(msg.clone()),
            Some(DomainError::Internal(msg)) => ApiError::Internal(msg.clone()),
            None => ApiError::Internal(err.to_string()),
        }
    }
}

/// Resolves the bearer token of `req` and checks that it belongs to the user
/// addressed by `path_id`.
async fn authorize_owner(
    state: &AppState,
    req: &HttpRequest,
    path_id: &str,
) -> Result<User, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let user = state.accounts.token_auth(token).await?;
    if path_id.trim().parse::<u32>().ok() != Some(user.id) {
        warn!(user_id = user.id, target = %path_id, "Token does not belong to target user");
        return Err(ApiError::Forbidden(
            "token does not grant access to this user".to_string(),
        ));
    }
    Ok(user)
}

/// Public view of a user; the password hash stays server-side.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserResponse {
    pub id: u32,
    pub name: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

impl From<Auth> for AuthResponse {
    fn from(auth: Auth) -> Self {
        Self {
            token: auth.token,
            user: auth.user.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub user: UserResponse,
    pub point_award: PointAward,
}

impl From<Registration> for RegistrationResponse {
    fn from(registration: Registration) -> Self {
        Self {
            user: registration.user.into(),
            point_award: registration.point_award,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
}

#[instrument]
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[instrument(skip(state))]
pub async fn list_users(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let users = state.accounts.get_all().await?;
    let body: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn create_user(
    state: web::Data<AppState>,
    req: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    let registration = state.accounts.create_model(req.into_inner()).await?;
    info!(
        user_id = registration.user.id,
        points_awarded = registration.point_award.is_awarded(),
        "User registered"
    );
    Ok(HttpResponse::Created().json(RegistrationResponse::from(registration)))
}

#[instrument(skip(state), fields(user_id = %*path))]
pub async fn get_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = state.accounts.get_by_id(&path).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[instrument(skip(state, http_req, req), fields(user_id = %*path))]
pub async fn update_user(
    state: web::Data<AppState>,
    http_req: HttpRequest,
    path: web::Path<String>,
    req: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    authorize_owner(&state, &http_req, &path).await?;
    let user = state.accounts.update_by_id(&path, req.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[instrument(skip(state, http_req), fields(user_id = %*path))]
pub async fn delete_user(
    state: web::Data<AppState>,
    http_req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    authorize_owner(&state, &http_req, &path).await?;
    state.accounts.delete_by_id(&path).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[instrument(skip(state, req), fields(email = %req.email))]
pub async fn login(
    state: web::Data<AppState>,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let LoginRequest { email, password } = req.into_inner();
    let auth = state
        .accounts
        .login_auth(&email, &password)
        .await
        .map_err(|e| match ApiError::from(e) {
            // Do not reveal which emails are registered.
            ApiError::NotFound(_) => ApiError::Unauthorized("Invalid email or password".to_string()),
            other => other,
        })?;
    Ok(HttpResponse::Ok().json(AuthResponse::from(auth)))
}

#[instrument(skip_all)]
pub async fn token_auth(
    state: web::Data<AppState>,
    req: web::Json<TokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = state.accounts.token_auth(&req.token).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[instrument(skip(state))]
pub async fn create_demo_data(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let auth = state.accounts.create_demo_data().await?;
    Ok(HttpResponse::Created().json(AuthResponse::from(auth)))
}
