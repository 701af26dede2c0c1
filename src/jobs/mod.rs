// Background jobs

pub mod subscription_expiry;
