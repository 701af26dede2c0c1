pub mod auth;
pub mod gym_access;
pub mod session;
