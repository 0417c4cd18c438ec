pub mod auth;
pub mod jwt;

pub use auth::{extract_bearer_token, AuthenticatedUser};
pub use jwt::{Claims, JwtConfig, JwtManager};
