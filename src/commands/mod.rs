pub mod logging;
pub mod mixer;
pub mod services;
