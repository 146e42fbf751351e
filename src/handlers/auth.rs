use axum::{
    extract::{Json, State},
    response::Response,
    routing::post,
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::errors::{ErrorResponse, ServiceError};
use crate::handlers::common::{created_response, success_response, validation_failure};
use crate::services::accounts::{
    LoginResult, PasswordResetOutcome, RegisterInput, RegistrationOutcome, ResetRequestAck,
    UserSummary,
};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset", post(reset_password))
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<UserSummary>),
        (status = 400, description = "Aggregated validation failures", body = ApiResponse<serde_json::Value>)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, ServiceError> {
    let outcome = state
        .services
        .accounts
        .register(RegisterInput {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    match outcome {
        RegistrationOutcome::Registered(user) => Ok(created_response(ApiResponse::success(user))),
        RegistrationOutcome::Rejected(problems) => Ok(validation_failure(problems)),
    }
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = ApiResponse<LoginResult>),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResult>>, ServiceError> {
    let result = state
        .services
        .accounts
        .login(&payload.email, &payload.password)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Request a password reset link
#[utoipa::path(
    post,
    path = "/auth/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Acknowledged (same response whether or not the account exists)", body = ApiResponse<ResetRequestAck>),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<ResetRequestAck>>, ServiceError> {
    let ack = state
        .services
        .accounts
        .request_password_reset(&payload.email)
        .await?;
    Ok(Json(ApiResponse::success(ack)))
}

/// Complete a password reset
#[utoipa::path(
    post,
    path = "/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Reset failed or weak password", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Response, ServiceError> {
    let outcome = state
        .services
        .accounts
        .reset_password(&payload.email, &payload.token, &payload.new_password)
        .await?;

    match outcome {
        PasswordResetOutcome::Completed => Ok(success_response(ApiResponse::success_message(
            "Password has been reset",
        ))),
        PasswordResetOutcome::WeakPassword(problems) => Ok(validation_failure(problems)),
    }
}
