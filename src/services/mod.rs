pub mod auth_service;
pub use auth_service::{AccessToken, AuthError, AuthService, TokenPair};

pub mod auth_service_impl;
pub use auth_service_impl::JwtAuthService;

pub mod image;
pub use image::{ImageError, ImageStore};

pub mod tokens;
pub use tokens::{Claims, TokenCodec, TokenType};
