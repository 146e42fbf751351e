use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{
    AuthRateLimiter, AuthService, IssuedToken, PasswordPolicy, RateLimitType, Role,
};
use crate::config::AppConfig;
use crate::entities::password_reset_token::{self, Entity as PasswordResetToken};
use crate::entities::user::{self, Entity as User};
use crate::entities::user_role::{self, Entity as UserRole};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::BUSINESS_METRICS;
use crate::notifications::{send_detached, EmailMessage, Mailer};

/// Message returned for both unknown-email and wrong-password logins. The
/// two cases must not be tellable apart from the outside.
const LOGIN_FAILED_MESSAGE: &str = "Invalid email or password";

/// Message returned for every failed reset attempt regardless of which
/// check rejected it.
const RESET_FAILED_MESSAGE: &str = "Password reset failed";

/// Account service: registration, login, password reset and the admin user
/// listing. Raw passwords and raw reset tokens never touch the database or
/// the logs.
#[derive(Clone)]
pub struct AccountService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    auth_service: Arc<AuthService>,
    mailer: Arc<dyn Mailer>,
    rate_limiter: Arc<AuthRateLimiter>,
    password_policy: PasswordPolicy,
    frontend_base_url: String,
    reset_token_ttl: Duration,
    max_page_size: u64,
}

/// Public shape of a user account. Never carries the password hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub roles: Vec<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

/// One page of users plus the unpaged total.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<UserSummary>,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Registration either succeeds or reports the full list of problems at
/// once, so a client can surface every fix in a single round trip.
#[derive(Debug)]
pub enum RegistrationOutcome {
    Registered(UserSummary),
    Rejected(Vec<String>),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResult {
    #[serde(flatten)]
    pub token: IssuedToken,
    pub email: String,
    pub first_name: String,
    pub roles: Vec<String>,
}

/// Canonical acknowledgement for a reset request. The message is identical
/// whether or not the address belongs to an account.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResetRequestAck {
    pub message: String,
}

impl Default for ResetRequestAck {
    fn default() -> Self {
        Self {
            message: "If that email address is registered, a password reset link has been sent"
                .to_string(),
        }
    }
}

/// A reset either completes, or fails the password policy with the full
/// violation list. Every other failure is the same generic error.
#[derive(Debug)]
pub enum PasswordResetOutcome {
    Completed,
    WeakPassword(Vec<String>),
}

impl AccountService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        mailer: Arc<dyn Mailer>,
        rate_limiter: Arc<AuthRateLimiter>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            auth_service,
            mailer,
            rate_limiter,
            password_policy: PasswordPolicy::default(),
            frontend_base_url: config.frontend_base_url.trim_end_matches('/').to_string(),
            reset_token_ttl: Duration::seconds(config.reset_token_ttl_secs as i64),
            max_page_size: u64::from(config.api_max_page_size),
        }
    }

    /// Registers a new account with the default "User" role. Validation
    /// problems are aggregated: the caller gets every failing check, not
    /// just the first one.
    #[instrument(skip(self, input))]
    pub async fn register(
        &self,
        input: RegisterInput,
    ) -> Result<RegistrationOutcome, ServiceError> {
        let first_name = input.first_name.trim().to_string();
        let last_name = input.last_name.trim().to_string();
        let email = input.email.trim().to_lowercase();

        let mut problems = Vec::new();
        if first_name.is_empty() {
            problems.push("First name is required".to_string());
        }
        if last_name.is_empty() {
            problems.push("Last name is required".to_string());
        }
        if !validator::validate_email(&email) {
            problems.push("Email address is not valid".to_string());
        } else if self.find_by_email(&email).await?.is_some() {
            problems.push("Email is already registered".to_string());
        }
        for violation in self.password_policy.violations(&input.password) {
            problems.push(violation.to_string());
        }
        if !problems.is_empty() {
            return Ok(RegistrationOutcome::Rejected(problems));
        }

        let password_hash = self.auth_service.hash_password(&input.password)?;

        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let default_role = Role::User.as_ref().to_string();

        let txn = self.db.begin().await?;
        let user = user::ActiveModel {
            id: Set(user_id),
            first_name: Set(first_name),
            last_name: Set(last_name),
            email: Set(email),
            password_hash: Set(password_hash),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let user = user.insert(&txn).await?;

        let role = user_role::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            role_name: Set(default_role.clone()),
            created_at: Set(now),
        };
        role.insert(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(user_id))
            .await;

        info!("Registered user {}", user_id);
        Ok(RegistrationOutcome::Registered(UserSummary {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            roles: vec![default_role],
            created_at: user.created_at,
        }))
    }

    /// Verifies credentials and issues a JWT. Unknown email, wrong password
    /// and a deactivated account all fail with the same message.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult, ServiceError> {
        let email = email.trim().to_lowercase();

        self.rate_limiter
            .check(&email, RateLimitType::Login)
            .await
            .map_err(|e| {
                warn!("Login throttled: {}", e);
                ServiceError::RateLimitExceeded
            })?;

        let Some(user) = self.find_by_email(&email).await? else {
            BUSINESS_METRICS.logins_failed.inc();
            warn!("Login attempt for unknown account");
            return Err(ServiceError::Unauthorized(LOGIN_FAILED_MESSAGE.to_string()));
        };

        if !user.active {
            BUSINESS_METRICS.logins_failed.inc();
            warn!("Login attempt for inactive user {}", user.id);
            return Err(ServiceError::Unauthorized(LOGIN_FAILED_MESSAGE.to_string()));
        }

        if !self
            .auth_service
            .verify_password(password, &user.password_hash)?
        {
            BUSINESS_METRICS.logins_failed.inc();
            warn!("Failed login for user {}", user.id);
            return Err(ServiceError::Unauthorized(LOGIN_FAILED_MESSAGE.to_string()));
        }

        self.rate_limiter
            .record_success(&email, RateLimitType::Login)
            .await;

        let roles = self.roles_for(&*self.db, user.id).await?;
        let token = self.auth_service.issue_token(&user, &roles)?;

        self.event_sender
            .send_or_log(Event::UserLoggedIn(user.id))
            .await;

        info!("User {} logged in", user.id);
        Ok(LoginResult {
            token,
            email: user.email,
            first_name: user.first_name,
            roles,
        })
    }

    /// Starts a password reset. The acknowledgement is the same whether the
    /// account exists or not; only an existing account gets a token row and
    /// an email, and delivery happens off the request path so its outcome
    /// cannot shade the response either.
    #[instrument(skip(self))]
    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<ResetRequestAck, ServiceError> {
        let email = email.trim().to_lowercase();

        self.rate_limiter
            .check(&email, RateLimitType::PasswordReset)
            .await
            .map_err(|e| {
                warn!("Password reset throttled: {}", e);
                ServiceError::RateLimitExceeded
            })?;

        let Some(user) = self.find_by_email(&email).await? else {
            debug!("Password reset requested for unknown address");
            return Ok(ResetRequestAck::default());
        };

        let raw_token = generate_reset_token();
        let now = Utc::now();

        let txn = self.db.begin().await?;
        // A new request supersedes any outstanding unused links.
        PasswordResetToken::delete_many()
            .filter(password_reset_token::Column::UserId.eq(user.id))
            .filter(password_reset_token::Column::UsedAt.is_null())
            .exec(&txn)
            .await?;
        let row = password_reset_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            token_hash: Set(hash_reset_token(&raw_token)),
            expires_at: Set(now + self.reset_token_ttl),
            created_at: Set(now),
            used_at: Set(None),
        };
        row.insert(&txn).await?;
        txn.commit().await?;

        let link = format!(
            "{}/reset-password?email={}&token={}",
            self.frontend_base_url,
            url::form_urlencoded::byte_serialize(user.email.as_bytes()).collect::<String>(),
            raw_token
        );
        let minutes = self.reset_token_ttl.num_minutes().max(1);
        send_detached(
            self.mailer.clone(),
            EmailMessage {
                to: user.email.clone(),
                subject: "Reset your password".to_string(),
                body: format!(
                    "Hello {},\n\nA password reset was requested for your account. \
                     Use the link below within {} minutes:\n\n{}\n\nIf you did not \
                     request this, you can ignore this email.",
                    user.first_name, minutes, link
                ),
            },
        );

        self.event_sender
            .send_or_log(Event::PasswordResetRequested(user.id))
            .await;

        info!("Password reset requested for user {}", user.id);
        Ok(ResetRequestAck::default())
    }

    /// Completes a reset. Unknown email, unknown token, expired token and
    /// already-used token all fail identically; only a policy-weak new
    /// password gets a distinct (aggregated) answer.
    #[instrument(skip(self, token, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<PasswordResetOutcome, ServiceError> {
        let violations = self.password_policy.violations(new_password);
        if !violations.is_empty() {
            return Ok(PasswordResetOutcome::WeakPassword(
                violations.into_iter().map(|v| v.to_string()).collect(),
            ));
        }

        let email = email.trim().to_lowercase();
        let rejected = || ServiceError::BadRequest(RESET_FAILED_MESSAGE.to_string());

        let user = self.find_by_email(&email).await?.ok_or_else(rejected)?;

        let row = PasswordResetToken::find()
            .filter(password_reset_token::Column::UserId.eq(user.id))
            .filter(password_reset_token::Column::TokenHash.eq(hash_reset_token(token)))
            .one(&*self.db)
            .await?
            .ok_or_else(rejected)?;

        let now = Utc::now();
        if !row.is_usable(now) {
            debug!("Rejected unusable reset token for user {}", user.id);
            return Err(rejected());
        }

        let password_hash = self.auth_service.hash_password(new_password)?;

        let txn = self.db.begin().await?;
        let mut user_update: user::ActiveModel = user.clone().into();
        user_update.password_hash = Set(password_hash);
        user_update.updated_at = Set(now);
        user_update.update(&txn).await?;

        let mut token_update: password_reset_token::ActiveModel = row.into();
        token_update.used_at = Set(Some(now));
        token_update.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PasswordResetCompleted(user.id))
            .await;

        info!("Password reset completed for user {}", user.id);
        Ok(PasswordResetOutcome::Completed)
    }

    /// Admin listing of accounts, oldest first, with role names attached.
    #[instrument(skip(self))]
    pub async fn list_users(&self, page: u64, per_page: u64) -> Result<UserPage, ServiceError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, self.max_page_size);

        let paginator = User::find()
            .order_by_asc(user::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let users = paginator.fetch_page(page - 1).await?;

        let user_ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
        let mut roles_by_user: HashMap<Uuid, Vec<String>> = HashMap::new();
        if !user_ids.is_empty() {
            for role in UserRole::find()
                .filter(user_role::Column::UserId.is_in(user_ids))
                .all(&*self.db)
                .await?
            {
                roles_by_user
                    .entry(role.user_id)
                    .or_default()
                    .push(role.role_name);
            }
        }

        Ok(UserPage {
            users: users
                .into_iter()
                .map(|u| UserSummary {
                    roles: roles_by_user.remove(&u.id).unwrap_or_default(),
                    id: u.id,
                    first_name: u.first_name,
                    last_name: u.last_name,
                    email: u.email,
                    created_at: u.created_at,
                })
                .collect(),
            total,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        let user = User::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?;
        Ok(user)
    }

    async fn roles_for<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
    ) -> Result<Vec<String>, ServiceError> {
        let roles = UserRole::find()
            .filter(user_role::Column::UserId.eq(user_id))
            .all(conn)
            .await?
            .into_iter()
            .map(|r| r.role_name)
            .collect();
        Ok(roles)
    }
}

/// 32 random bytes, URL-safe base64 without padding. Safe to embed in a
/// query string as-is.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Only this digest is persisted; a database dump alone cannot redeem a
/// reset link.
fn hash_reset_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
