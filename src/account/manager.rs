/// Account manager implementation using runtime queries
use crate::{
    account::{
        IssuedSession, Profile, Role, SignupRequest, UpdateProfileRequest, ValidatedSession,
        PROFILE_COLUMNS,
    },
    config::ServerConfig,
    error::{is_unique_violation, PortalError, PortalResult},
    invitation::{self, Invitation},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    sid: String,
    role: String,
    iat: i64,
    exp: i64,
}

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Create a profile
    ///
    /// Without an invitation the profile is a landlord. With one, the role
    /// comes from the invitation and the invitation is accepted (unit or
    /// guard post assigned) in the same transaction as the insert.
    pub async fn signup(
        &self,
        req: SignupRequest,
        invitation: Option<Invitation>,
    ) -> PortalResult<Profile> {
        let email = req.email.trim().to_lowercase();

        if self.email_exists(&email).await? {
            return Err(PortalError::Conflict("Email already registered".to_string()));
        }

        let role = match &invitation {
            Some(inv) => {
                if !inv.email.eq_ignore_ascii_case(&email) {
                    return Err(PortalError::Validation(
                        "Invitation was issued to a different email address".to_string(),
                    ));
                }
                inv.role
            }
            None => Role::Landlord,
        };

        let password_hash = hash_password(&req.password)?;
        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash,
            role,
            full_name: req.full_name.trim().to_string(),
            phone: req.phone.filter(|p| !p.trim().is_empty()),
            property_id: None,
            created_at: Utc::now(),
        };

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO profiles (id, email, password_hash, role, full_name, phone, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&profile.password_hash)
        .bind(profile.role.as_str())
        .bind(&profile.full_name)
        .bind(&profile.phone)
        .bind(profile.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortalError::Conflict("Email already registered".to_string())
            } else {
                PortalError::Database(e)
            }
        })?;

        let mut profile = profile;
        if let Some(inv) = &invitation {
            invitation::accept_in(&mut tx, inv, &profile.id).await?;
            if inv.role == Role::Guard {
                profile.property_id = Some(inv.property_id.clone());
            }
        }

        tx.commit().await?;

        tracing::info!(
            profile_id = %profile.id,
            role = profile.role.as_str(),
            invited = invitation.is_some(),
            "profile created"
        );

        Ok(profile)
    }

    /// Authenticate by email and password and create a session
    pub async fn login(&self, email: &str, password: &str) -> PortalResult<(Profile, IssuedSession)> {
        let profile = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| PortalError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(password, &profile.password_hash)? {
            return Err(PortalError::Authentication("Invalid credentials".to_string()));
        }

        let session = self.create_session(&profile).await?;

        Ok((profile, session))
    }

    /// Create a session for a profile
    pub async fn create_session(&self, profile: &Profile) -> PortalResult<IssuedSession> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.config.authentication.session_ttl_hours);

        let claims = SessionClaims {
            sub: profile.id.clone(),
            sid: session_id.clone(),
            role: profile.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| PortalError::Jwt(format!("Failed to generate token: {}", e)))?;

        sqlx::query(
            "INSERT INTO sessions (id, profile_id, token_hash, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session_id)
        .bind(&profile.id)
        .bind(hash_token(&token))
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(IssuedSession {
            session_id,
            token,
            expires_at,
        })
    }

    /// Validate an access token and return session info
    ///
    /// The JWT must verify and its session row must still exist, so logout
    /// revokes a token before it expires.
    pub async fn validate_access_token(&self, token: &str) -> PortalResult<ValidatedSession> {
        let claims = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            tracing::debug!("session token rejected: {}", e);
            PortalError::Authentication("Invalid or expired session".to_string())
        })?
        .claims;

        let row = sqlx::query("SELECT id, profile_id, expires_at FROM sessions WHERE token_hash = ?1")
            .bind(hash_token(token))
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PortalError::Authentication("Invalid or expired session".to_string()))?;

        let session_id: String = row.get("id");
        let profile_id: String = row.get("profile_id");
        let expires_at: DateTime<Utc> = row.get("expires_at");

        if Utc::now() > expires_at {
            return Err(PortalError::Authentication("Session expired".to_string()));
        }

        if session_id != claims.sid || profile_id != claims.sub {
            return Err(PortalError::Authentication("Session mismatch".to_string()));
        }

        Ok(ValidatedSession {
            profile_id,
            session_id,
            role: Role::from_str(&claims.role)?,
        })
    }

    /// Delete a session (logout)
    pub async fn delete_session(&self, session_id: &str) -> PortalResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Get profile by id
    pub async fn get_profile(&self, id: &str) -> PortalResult<Profile> {
        let row = sqlx::query(&format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PortalError::NotFound("Profile not found".to_string()))?;

        Profile::from_row(&row)
    }

    /// Find profile by email (case-insensitive)
    pub async fn find_by_email(&self, email: &str) -> PortalResult<Option<Profile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE email = ?1 COLLATE NOCASE",
            PROFILE_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Profile::from_row).transpose()
    }

    async fn email_exists(&self, email: &str) -> PortalResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM profiles WHERE email = ?1 COLLATE NOCASE")
                .bind(email)
                .fetch_one(&self.db)
                .await?;

        Ok(count > 0)
    }

    /// Update name and phone of the caller's profile
    pub async fn update_profile(&self, id: &str, req: UpdateProfileRequest) -> PortalResult<Profile> {
        let current = self.get_profile(id).await?;
        let full_name = req
            .full_name
            .map(|n| n.trim().to_string())
            .unwrap_or(current.full_name);
        let phone = match req.phone {
            Some(p) if p.trim().is_empty() => None,
            Some(p) => Some(p),
            None => current.phone,
        };

        sqlx::query("UPDATE profiles SET full_name = ?1, phone = ?2 WHERE id = ?3")
            .bind(&full_name)
            .bind(&phone)
            .bind(id)
            .execute(&self.db)
            .await?;

        self.get_profile(id).await
    }

    /// Cleanup expired sessions
    ///
    /// Called periodically by the job scheduler.
    pub async fn cleanup_expired_sessions(&self) -> PortalResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(sessions_deleted = deleted, "Cleaned up expired sessions");
        } else {
            tracing::debug!("Session cleanup: no expired sessions found");
        }

        Ok(deleted)
    }
}

fn hash_password(password: &str) -> PortalResult<String> {
    Argon2::default()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
        .map(|h| h.to_string())
        .map_err(|e| PortalError::Internal(format!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> PortalResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| PortalError::Internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Sessions are stored by token digest, never the token itself
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
