pub mod definition;
pub mod delegation;
pub mod request;
pub mod step;
pub mod user;
