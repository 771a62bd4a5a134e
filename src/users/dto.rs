use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::services::{is_valid_email, MIN_PASSWORD_LEN};
use crate::error::FieldErrors;
use crate::recipes::dto::RecipeShort;

pub const MAX_NAME_LENGTH: usize = 150;
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
}

fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

fn require(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.is_empty() {
        errors.add(field, "This field is required.");
    } else if value.chars().count() > max {
        errors.add(field, format!("Ensure this field has no more than {max} characters."));
    }
}

impl RegisterRequest {
    /// Trim and lowercase what should be, then check shapes. Uniqueness is checked later.
    pub fn normalize_and_validate(&mut self) -> Result<(), FieldErrors> {
        self.email = self.email.trim().to_lowercase();
        self.username = self.username.trim().to_string();
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();

        let mut errors = FieldErrors::new();
        require(&mut errors, "email", &self.email, MAX_EMAIL_LENGTH);
        if !self.email.is_empty() && !is_valid_email(&self.email) {
            errors.add("email", "Enter a valid email address.");
        }
        require(&mut errors, "username", &self.username, MAX_NAME_LENGTH);
        if !self.username.is_empty() && !is_valid_username(&self.username) {
            errors.add(
                "username",
                "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        require(&mut errors, "first_name", &self.first_name, MAX_NAME_LENGTH);
        require(&mut errors, "last_name", &self.last_name, MAX_NAME_LENGTH);
        if self.password.is_empty() {
            errors.add("password", "This field is required.");
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters."),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Returned right after registration.
#[derive(Debug, Serialize)]
pub struct UserCreated {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// Public view of a user, as seen by the requesting user.
#[derive(Debug, Clone, Serialize)]
pub struct UserRead {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub is_subscribed: bool,
}

/// An author together with a preview of their recipes.
#[derive(Debug, Serialize)]
pub struct UserWithRecipes {
    #[serde(flatten)]
    pub user: UserRead,
    pub recipes: Vec<RecipeShort>,
    pub recipes_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct AvatarRequest {
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RegisterRequest {
        RegisterRequest {
            email: "  Cook@Example.com ".into(),
            username: "cook_01".into(),
            first_name: "Ann".into(),
            last_name: "Smith".into(),
            password: "long-enough".into(),
        }
    }

    #[test]
    fn normalizes_email() {
        let mut req = valid();
        req.normalize_and_validate().unwrap();
        assert_eq!(req.email, "cook@example.com");
    }

    #[test]
    fn reports_every_bad_field() {
        let mut req = RegisterRequest {
            email: "nope".into(),
            username: "bad name!".into(),
            first_name: String::new(),
            last_name: "x".repeat(151),
            password: "short".into(),
        };
        let errors = req.normalize_and_validate().unwrap_err();
        for field in ["email", "username", "first_name", "last_name", "password"] {
            assert!(errors.get(field).is_some(), "{field} should fail");
        }
    }

    #[test]
    fn username_charset() {
        assert!(is_valid_username("a.b@c+d-e_f"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(""));
    }

    #[test]
    fn user_with_recipes_is_flat() {
        let view = UserWithRecipes {
            user: UserRead {
                id: Uuid::nil(),
                email: "a@b.c".into(),
                username: "a".into(),
                first_name: "A".into(),
                last_name: "B".into(),
                avatar: None,
                is_subscribed: true,
            },
            recipes: vec![],
            recipes_count: 0,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["username"], "a");
        assert_eq!(json["is_subscribed"], true);
        assert_eq!(json["recipes_count"], 0);
        assert!(json.get("user").is_none());
    }
}
