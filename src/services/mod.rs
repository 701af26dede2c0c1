// Services module - Business logic

pub mod auth_client;
pub mod billing;
pub mod check_in;
pub mod enrollment;
pub mod point_of_sale;
pub mod qr_generator;
pub mod roles;
pub mod signature;
pub mod staff;
pub mod storage;
pub mod tokens;
