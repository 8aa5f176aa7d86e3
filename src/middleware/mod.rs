// Middleware modules
pub mod logging;
pub mod pattern;

pub use logging::{logging_middleware, LoggingError, RequestLogged};
pub use pattern::{UrlPattern, UrlPatterns};
