pub mod handlers;
pub mod service;

pub use handlers::*;
pub use service::*;
