//! Authentication module for Tandem

pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, JwtError, JwtManager, TokenPair, TokenType};
pub use middleware::{bearer_token, require_auth, AuthUser};
pub use password::{hash_password, validate_password, verify_password};
