use crate::domain::error::DomainError;
use crate::domain::gateway::PointGateway;
use crate::domain::repository::UserRepository;
use crate::domain::user::{Auth, NewUser, PointAward, Registration, User};
use crate::infrastructure::security::{hash_password, verify_password};
use crate::infrastructure::token::TokenCodec;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, trace, warn};

pub const SIGNUP_BONUS_COMMENT: &str = "signup bonus";

const DEMO_PASSWORD: &str = "demopassword";
const DEMO_SUFFIX_ATTEMPTS: u32 = 5;

/// Account lifecycle and authentication over a user store and the point
/// service.
pub struct AccountService<R: UserRepository, P: PointGateway> {
    user_repository: Arc<R>,
    point_gateway: Arc<P>,
    tokens: TokenCodec,
    signup_bonus_points: i64,
}

impl<R: UserRepository, P: PointGateway> AccountService<R, P> {
    pub fn new(
        user_repository: Arc<R>,
        point_gateway: Arc<P>,
        tokens: TokenCodec,
        signup_bonus_points: i64,
    ) -> Self {
        Self {
            user_repository,
            point_gateway,
            tokens,
            signup_bonus_points,
        }
    }

    /// Stores `new_user` with a hashed password, then tries to award the
    /// signup bonus. The award outcome is reported, never fatal.
    #[instrument(skip(self, new_user), fields(email = %new_user.email))]
    pub async fn create_model(&self, new_user: NewUser) -> Result<Registration> {
        trace!("Starting user creation");

        let user = User {
            id: 0,
            name: new_user.name,
            email: new_user.email,
            password: self.hash(&new_user.password)?,
        };
        let user = self.user_repository.insert(user).await?;
        info!(user_id = user.id, email = %user.email, "User created");

        let point_award = self.award_signup_bonus(&user).await;
        Ok(Registration { user, point_award })
    }

    async fn award_signup_bonus(&self, user: &User) -> PointAward {
        let result = match self.tokens.issue(user.id) {
            Ok(token) => {
                self.point_gateway
                    .create_point(self.signup_bonus_points, SIGNUP_BONUS_COMMENT, &token)
                    .await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                debug!(user_id = user.id, points = self.signup_bonus_points, "Signup bonus awarded");
                PointAward::Awarded {
                    points: self.signup_bonus_points,
                }
            }
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Signup bonus not awarded");
                PointAward::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: &str) -> Result<User> {
        let id = parse_id(id)?;
        self.user_repository.find_by_id(id).await?.ok_or_else(|| {
            warn!(user_id = id, "User not found");
            DomainError::NotFound(format!("user {}", id)).into()
        })
    }

    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<User>> {
        let users = self.user_repository.find_all().await?;
        debug!(count = users.len(), "Users listed");
        Ok(users)
    }

    /// Replaces name and email of user `id` and stores a fresh hash of the
    /// new password.
    #[instrument(skip(self, new_user), fields(email = %new_user.email))]
    pub async fn update_by_id(&self, id: &str, new_user: NewUser) -> Result<User> {
        let id = parse_id(id)?;

        if self.user_repository.find_by_id(id).await?.is_none() {
            warn!(user_id = id, "User not found for update");
            return Err(DomainError::NotFound(format!("user {}", id)).into());
        }

        let user = User {
            id,
            name: new_user.name,
            email: new_user.email,
            password: self.hash(&new_user.password)?,
        };
        let updated = self
            .user_repository
            .update(id, user)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {}", id)))?;

        info!(user_id = id, "User updated");
        Ok(updated)
    }

    /// Deleting an id that does not exist succeeds without effect.
    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, id: &str) -> Result<()> {
        let id = parse_id(id)?;
        if self.user_repository.delete(id).await? {
            info!(user_id = id, "User deleted");
        } else {
            debug!(user_id = id, "Delete of absent user ignored");
        }
        Ok(())
    }

    #[instrument(skip(self, password))]
    pub async fn login_auth(&self, email: &str, password: &str) -> Result<Auth> {
        trace!("Starting login");

        let user = self
            .user_repository
            .find_by_email(email)
            .await?
            .ok_or_else(|| {
                warn!(email = email, "Unknown email during login");
                DomainError::NotFound(format!("user with email {}", email))
            })?;

        let is_valid = verify_password(password, &user.password).map_err(|e| {
            error!(user_id = user.id, error = %e, "Stored password hash is unreadable");
            DomainError::Internal(format!("Failed to verify password: {}", e))
        })?;
        if !is_valid {
            warn!(user_id = user.id, "Invalid password during login");
            return Err(DomainError::InvalidCredentials.into());
        }

        let token = self.tokens.issue(user.id)?;
        info!(user_id = user.id, email = %user.email, "Login successful");
        Ok(Auth { token, user })
    }

    /// Resolves a token to a live user. A well-signed token whose user has
    /// since been deleted is rejected.
    #[instrument(skip_all)]
    pub async fn token_auth(&self, token: &str) -> Result<User> {
        let id = self.tokens.verify(token)?;
        let user = self.user_repository.find_by_id(id).await?.ok_or_else(|| {
            warn!(user_id = id, "Token refers to a user that no longer exists");
            DomainError::InvalidToken(format!("user {} no longer exists", id))
        })?;
        debug!(user_id = user.id, "Token authenticated");
        Ok(user)
    }

    /// Creates two fresh demo users and returns a login for the first.
    ///
    /// Safe to repeat: every call adds two users with new suffixes.
    #[instrument(skip(self))]
    pub async fn create_demo_data(&self) -> Result<Auth> {
        let guest = self
            .create_unique_demo_user(NewUser::new("Demo Guest", "guest@demo.example", DEMO_PASSWORD))
            .await?;
        let host = self
            .create_unique_demo_user(NewUser::new("Demo Host", "host@demo.example", DEMO_PASSWORD))
            .await?;
        debug!(guest_id = guest.id, host_id = host.id, "Demo users created");

        let auth = self.login_auth(&guest.email, DEMO_PASSWORD).await?;
        info!(user_id = auth.user.id, "Demo data ready");
        Ok(auth)
    }

    /// Suffixes the template's name and email with `max_user_id() + 1` and
    /// creates the result. When that email is already taken, the next suffix
    /// is tried, up to `DEMO_SUFFIX_ATTEMPTS` times.
    pub async fn create_unique_demo_user(&self, template: NewUser) -> Result<User> {
        let mut suffix = self.max_user_id().await?.saturating_add(1);
        let mut attempt = 1;

        loop {
            let demo = NewUser {
                name: format!("{}{}", template.name, suffix),
                email: suffix_email(&template.email, suffix),
                password: template.password.clone(),
            };

            match self.create_model(demo).await {
                Ok(registration) => {
                    if !registration.point_award.is_awarded() {
                        debug!(user_id = registration.user.id, "Demo user created without signup bonus");
                    }
                    return Ok(registration.user);
                }
                Err(e)
                    if attempt < DEMO_SUFFIX_ATTEMPTS
                        && matches!(e.downcast_ref::<DomainError>(), Some(DomainError::Conflict(_))) =>
                {
                    debug!(suffix = suffix, attempt = attempt, "Demo email taken, trying next suffix");
                    suffix = suffix.saturating_add(1);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn max_user_id(&self) -> Result<u32> {
        self.user_repository.max_id().await
    }

    fn hash(&self, plain: &str) -> Result<String> {
        hash_password(plain).map_err(|e| {
            error!(error = %e, "Failed to hash password");
            DomainError::Internal(format!("Failed to hash password: {}", e)).into()
        })
    }
}

fn parse_id(raw: &str) -> Result<u32, DomainError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| DomainError::InvalidId(raw.to_string()))
}

fn suffix_email(email: &str, suffix: u32) -> String {
    match email.split_once('@') {
        Some((local, domain)) => format!("{}{}@{}", local, suffix, domain),
        None => format!("{}{}", email, suffix),
    }
}
