//! Authentication utilities

mod jwt;

pub use jwt::{Claims, JwtIdentityProvider, JwtService, TokenType};
