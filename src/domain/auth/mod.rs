pub mod dto;
pub mod service;
pub mod token_manager;

pub use dto::{LoginRequest, RefreshTokenRequest, TokenResponse};
pub use service::AuthService;
pub use token_manager::TokenManager;
