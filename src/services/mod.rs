pub mod allocator;
pub mod booking;
pub mod clock;
pub mod generator;
pub mod lock;
pub mod rate_limit;
pub mod validation;
