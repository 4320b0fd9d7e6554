pub mod default;
pub mod error;
pub mod patterns;
pub mod resolver;
pub mod upstream;

pub use default::{create_client_builder, default_client};
