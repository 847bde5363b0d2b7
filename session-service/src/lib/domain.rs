pub mod errors;
pub mod session;
pub mod user;
