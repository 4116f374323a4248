pub mod file_service;
pub mod key_scheme;
pub mod token_service;
