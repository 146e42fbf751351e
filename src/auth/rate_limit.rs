/*!
 * # Rate Limiting Module for Authentication
 *
 * Fixed-window limits on login and password-reset attempts, keyed by the
 * submitted email address. Repeated login failures lock the key out for a
 * fixed duration.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::config::AppConfig;

/// Rate limit configuration
#[derive(Clone, Debug)]
pub struct AuthRateLimitConfig {
    pub login_max_attempts: u32,
    pub login_window: Duration,
    pub login_lockout_duration: Duration,
    pub password_reset_max: u32,
    pub password_reset_window: Duration,
}

impl Default for AuthRateLimitConfig {
    fn default() -> Self {
        Self {
            login_max_attempts: 5,
            login_window: Duration::from_secs(60 * 5),
            login_lockout_duration: Duration::from_secs(60 * 15),
            password_reset_max: 3,
            password_reset_window: Duration::from_secs(60 * 60),
        }
    }
}

impl AuthRateLimitConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            login_max_attempts: config.login_max_attempts,
            login_window: Duration::from_secs(config.login_window_secs),
            ..Self::default()
        }
    }
}

/// Rate limit entry
#[derive(Debug, Clone)]
struct RateLimitEntry {
    attempts: u32,
    first_attempt: Instant,
    locked_until: Option<Instant>,
}

impl RateLimitEntry {
    fn new() -> Self {
        Self {
            attempts: 0,
            first_attempt: Instant::now(),
            locked_until: None,
        }
    }

    fn increment(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    fn is_locked(&self) -> bool {
        if let Some(locked_until) = self.locked_until {
            Instant::now() < locked_until
        } else {
            false
        }
    }

    fn lock(&mut self, duration: Duration) {
        self.locked_until = Some(Instant::now() + duration);
    }

    fn time_since_first(&self) -> Duration {
        Instant::now().duration_since(self.first_attempt)
    }

    fn remaining_lockout(&self) -> Option<Duration> {
        self.locked_until.map(|t| {
            if t > Instant::now() {
                t.duration_since(Instant::now())
            } else {
                Duration::from_secs(0)
            }
        })
    }

    fn should_reset(&self, window: Duration) -> bool {
        self.time_since_first() > window
    }
}

/// Rate limit type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    Login,
    PasswordReset,
}

/// Auth rate limiter for preventing brute force attacks
#[derive(Clone)]
pub struct AuthRateLimiter {
    config: AuthRateLimitConfig,
    limits: Arc<Mutex<HashMap<(String, RateLimitType), RateLimitEntry>>>,
}

impl AuthRateLimiter {
    pub fn new(config: AuthRateLimitConfig) -> Self {
        Self {
            config,
            limits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if a key is rate limited, counting this call as an attempt.
    pub async fn check(&self, key: &str, limit_type: RateLimitType) -> Result<(), RateLimitError> {
        let mut limits = self.limits.lock().await;
        let entry_key = (key.to_string(), limit_type);

        let entry = limits
            .entry(entry_key.clone())
            .or_insert_with(RateLimitEntry::new);

        if entry.is_locked() {
            let remaining = entry.remaining_lockout().unwrap_or(Duration::from_secs(0));
            return Err(RateLimitError::AccountLocked {
                remaining_seconds: remaining.as_secs(),
            });
        }

        let (max_attempts, window, lockout_duration) = match limit_type {
            RateLimitType::Login => (
                self.config.login_max_attempts,
                self.config.login_window,
                Some(self.config.login_lockout_duration),
            ),
            RateLimitType::PasswordReset => (
                self.config.password_reset_max,
                self.config.password_reset_window,
                None,
            ),
        };

        // An expired window starts a fresh count; this call still counts.
        if entry.should_reset(window) {
            *entry = RateLimitEntry::new();
        }

        if entry.attempts >= max_attempts {
            if let Some(duration) = lockout_duration {
                entry.lock(duration);
                return Err(RateLimitError::AccountLocked {
                    remaining_seconds: duration.as_secs(),
                });
            }

            return Err(RateLimitError::TooManyAttempts {
                max_attempts,
                retry_after: window.saturating_sub(entry.time_since_first()).as_secs(),
            });
        }

        entry.increment();
        Ok(())
    }

    /// Record a successful attempt (resets the counter)
    pub async fn record_success(&self, key: &str, limit_type: RateLimitType) {
        let mut limits = self.limits.lock().await;
        limits.remove(&(key.to_string(), limit_type));
    }

    /// Clean up old entries
    pub async fn cleanup(&self) {
        let mut limits = self.limits.lock().await;

        limits.retain(|&(_, limit_type), entry| {
            let window = match limit_type {
                RateLimitType::Login => self.config.login_window,
                RateLimitType::PasswordReset => self.config.password_reset_window,
            };

            // Keep entries for 2x the window
            !entry.should_reset(window * 2)
        });
    }
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::new(AuthRateLimitConfig::default())
    }
}

/// Rate limit error
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Too many attempts ({max_attempts}). Please try again in {retry_after} seconds.")]
    TooManyAttempts { max_attempts: u32, retry_after: u64 },

    #[error("Account locked. Please try again in {remaining_seconds} seconds.")]
    AccountLocked { remaining_seconds: u64 },
}

/// Background task to clean up old rate limit entries
pub async fn cleanup_rate_limits(rate_limiter: Arc<AuthRateLimiter>) {
    loop {
        // Clean up every hour
        sleep(Duration::from_secs(60 * 60)).await;
        rate_limiter.cleanup().await;
    }
}
