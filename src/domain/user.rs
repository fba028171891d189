use serde::{Deserialize, Serialize};

/// A persisted account. `password` always holds the argon2 PHC hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Caller input for create and update. The password is plaintext.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl NewUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// A signed token paired with the user it was issued for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub token: String,
    pub user: User,
}

/// Outcome of the signup bonus call made after a user is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PointAward {
    Awarded { points: i64 },
    Failed { reason: String },
}

impl PointAward {
    pub fn is_awarded(&self) -> bool {
        matches!(self, PointAward::Awarded { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub user: User,
    pub point_award: PointAward,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}
