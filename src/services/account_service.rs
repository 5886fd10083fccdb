use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppError;
use crate::kats_api::{KatsClient, dto};
use crate::models::{ConfirmPasswordRequest, ForgotPasswordRequest, ResetPasswordRequest};

const MIN_PASSWORD_LEN: usize = 6;

pub struct AccountService {
    client: Arc<dyn KatsClient>,
}

fn invalid(message: &str) -> AppError {
    AppError::Validation(message.to_string())
}

/// Loose `local@domain.tld` check: no whitespace, one `@`, a dot in the
/// domain with text on both sides.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub fn validate_reset(req: &ResetPasswordRequest) -> Result<(), AppError> {
    if !is_valid_email(req.email.trim()) {
        return Err(invalid("Please enter a valid email address"));
    }
    if req.current_password.is_empty() || req.new_password.is_empty() || req.confirm_password.is_empty() {
        return Err(invalid("Please fill in all fields"));
    }
    if req.current_password == req.new_password {
        return Err(invalid("New password must be different from current password"));
    }
    if req.new_password != req.confirm_password {
        return Err(invalid("New passwords do not match"));
    }
    if req.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid("New password must be at least 6 characters long"));
    }
    Ok(())
}

pub fn validate_confirm(req: &ConfirmPasswordRequest) -> Result<(), AppError> {
    if req.token.trim().is_empty() {
        return Err(invalid("Invalid or expired token."));
    }
    if req.new_password.is_empty() || req.confirm_password.is_empty() {
        return Err(invalid("Please fill in all fields"));
    }
    if req.new_password != req.confirm_password {
        return Err(invalid("Passwords do not match"));
    }
    if req.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid("Password must be at least 6 characters long"));
    }
    Ok(())
}

/// Rewrites an upstream failure into the message shown to the caretaker.
fn explain(err: AppError, prefix: &str, by_status: &[(u16, &str)]) -> AppError {
    match err {
        AppError::Upstream { status, message } => {
            let detail = by_status
                .iter()
                .find(|(code, _)| *code == status)
                .map(|(_, text)| text.to_string())
                .unwrap_or_else(|| {
                    if message.is_empty() {
                        "Please try again.".to_string()
                    } else {
                        message
                    }
                });
            warn!("account request failed with {}: {}", status, detail);
            AppError::Upstream {
                status,
                message: format!("{} {}", prefix, detail),
            }
        }
        other => other,
    }
}

impl AccountService {
    pub fn new(client: Arc<dyn KatsClient>) -> Self {
        Self { client }
    }

    pub async fn request_password_link(&self, req: &ForgotPasswordRequest) -> Result<String, AppError> {
        let email = req.email.trim();
        if email.is_empty() {
            return Err(invalid("Please enter your email address"));
        }

        let message = self
            .client
            .request_password_link(email)
            .await
            .map_err(|e| {
                explain(
                    e,
                    "Failed to process request.",
                    &[
                        (404, "Email not found."),
                        (400, "Invalid email format."),
                        (429, "Too many attempts. Please try again later."),
                        (500, "Server error. Please try again later."),
                    ],
                )
            })?;

        info!("Password reset link requested");
        Ok(message.unwrap_or_else(|| "Password reset link has been sent to your email.".to_string()))
    }

    pub async fn reset_password(&self, req: &ResetPasswordRequest) -> Result<(), AppError> {
        validate_reset(req)?;

        let body = dto::ResetPasswordBody {
            identifier: req.email.trim(),
            old_password: &req.current_password,
            new_password: &req.new_password,
        };
        self.client.reset_password(&body).await.map_err(|e| {
            explain(
                e,
                "Failed to reset password.",
                &[
                    (404, "Email not found."),
                    (401, "Current password is incorrect."),
                    (429, "Too many attempts. Please try again later."),
                ],
            )
        })?;

        info!("Password reset for {}", req.email.trim());
        Ok(())
    }

    pub async fn confirm_password(&self, req: &ConfirmPasswordRequest) -> Result<(), AppError> {
        validate_confirm(req)?;

        let body = dto::ConfirmPasswordBody {
            token: req.token.trim(),
            new_password: &req.new_password,
            confirm_password: &req.confirm_password,
        };
        self.client
            .confirm_password(&body)
            .await
            .map_err(|e| explain(e, "Failed to set password.", &[(400, "Invalid or expired token.")]))?;

        info!("Password set from reset token");
        Ok(())
    }
}
