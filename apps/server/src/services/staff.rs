//! Staff accounts - self-registration and password login
//!
//! Passwords are stored as bcrypt hashes. Hashing and verification run on the blocking
//! pool so a login never stalls the request executor.

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::{AuthManager, IssuedToken},
    config::AuthConfig,
    db::StaffStore,
    models::{staff::DEFAULT_ROLE, Staff},
    Error, Result,
};

const DUPLICATE_USERNAME: &str = "username already exists for hospital";

/// A registration request after transport decoding.
#[derive(Debug, Clone)]
pub struct NewStaff {
    pub username: String,
    pub password: String,
    pub hospital_id: String,
    pub display_name: Option<String>,
}

#[derive(Clone)]
pub struct StaffService {
    store: Arc<dyn StaffStore>,
    auth: AuthManager,
    password_min_length: usize,
    bcrypt_cost: u32,
}

impl StaffService {
    pub fn new(store: Arc<dyn StaffStore>, auth: AuthManager, config: &AuthConfig) -> Self {
        Self {
            store,
            auth,
            password_min_length: config.password_min_length,
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    /// Create an account with the default role.
    ///
    /// # Errors
    /// * `Validation` - If a required field is blank or the password is too short
    /// * `AlreadyExists` - If the username is taken within the hospital
    #[tracing::instrument(skip(self, request), fields(hospital_id = %request.hospital_id))]
    pub async fn register(&self, request: NewStaff) -> Result<Staff> {
        let username = required("username", &request.username)?;
        let hospital_id = required("hospital_id", &request.hospital_id)?;
        if request.password.chars().count() < self.password_min_length {
            return Err(Error::Validation("weak password".to_string()));
        }

        if self
            .store
            .get_by_username(&username, &hospital_id)
            .await?
            .is_some()
        {
            return Err(Error::AlreadyExists(DUPLICATE_USERNAME.to_string()));
        }

        let password = request.password;
        let cost = self.bcrypt_cost;
        let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| Error::Internal(format!("password hashing task failed: {e}")))?
            .map_err(|e| Error::Internal(format!("password hashing failed: {e}")))?;

        let staff = Staff {
            id: Uuid::new_v4(),
            username,
            password_hash,
            hospital_id,
            display_name: request
                .display_name
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            role: DEFAULT_ROLE.to_string(),
            created_at: None,
            updated_at: None,
        };

        // A concurrent registration can still win between the check and the insert.
        let stored = match self.store.create(staff).await {
            Err(Error::Conflict(_)) => {
                return Err(Error::AlreadyExists(DUPLICATE_USERNAME.to_string()))
            }
            other => other?,
        };

        tracing::info!(staff_id = %stored.id, username = %stored.username, "Staff registered");
        Ok(stored)
    }

    /// Check credentials and issue an access token scoped to the staff member's hospital.
    ///
    /// # Errors
    /// * `InvalidCredentials` - If the account does not exist or the password is wrong
    #[tracing::instrument(skip(self, password))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        hospital_id: &str,
    ) -> Result<IssuedToken> {
        let Some(staff) = self
            .store
            .get_by_username(username.trim(), hospital_id.trim())
            .await?
        else {
            tracing::debug!("Login for unknown staff account");
            return Err(Error::InvalidCredentials);
        };

        let password = password.to_string();
        let hash = staff.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| Error::Internal(format!("password verification task failed: {e}")))?
            // An unparseable stored hash cannot match anything.
            .unwrap_or(false);
        if !verified {
            tracing::debug!(staff_id = %staff.id, "Login with wrong password");
            return Err(Error::InvalidCredentials);
        }

        let token = self
            .auth
            .issue(&staff)
            .map_err(|e| Error::Internal(format!("{e:?}")))?;
        tracing::info!(staff_id = %staff.id, "Staff logged in");
        Ok(token)
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}
