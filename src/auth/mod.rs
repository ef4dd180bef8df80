use axum::{
    routing::{get, post},
    Router,
};
use rand::seq::IndexedRandom;

mod identity;
mod login;
mod me;
pub mod password;
pub mod token;

pub use identity::Identity;
pub(crate) use identity::bearer_token;
pub use login::{AuthResponse, LoginRequest, RegisterRequest};
pub use token::{Claims, TokenSigner};

use crate::{AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(login::register))
        .route("/login", post(login::login))
        .route("/me", get(me::me))
}

/// A friendly "Adjective Noun" display name for users who don't pick one.
pub(crate) fn random_alias() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
    ];

    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
        "Unicorn", "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
    ];

    let mut rng = rand::rng();
    format!(
        "{} {}",
        adjectives.choose(&mut rng).unwrap_or(&"Nameless"),
        nouns.choose(&mut rng).unwrap_or(&"User"),
    )
}

pub(crate) fn validate_username(username: &str) -> AppResult<()> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !(3..=32).contains(&username.len()) || !valid_chars {
        return Err(AppError::validation_code(
            "username must be 3 to 32 characters of letters, digits, '_', '.' or '-'",
            "invalid_username",
        ));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < 6 {
        return Err(AppError::validation_code(
            "password must be at least 6 characters",
            "weak_password",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_has_two_words() {
        let alias = random_alias();
        assert_eq!(alias.split(' ').count(), 2, "{alias}");
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.b-c_d").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
    }
}
