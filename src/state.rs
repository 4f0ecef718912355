use std::sync::Arc;

use crate::config::AppConfig;
use crate::coordination::Coordinator;
use crate::db::Store;
use crate::services::allocator::SlotAllocator;
use crate::services::booking::BookingExecutor;
use crate::services::clock::Clock;
use crate::services::lock::LockCoordinator;
use crate::services::rate_limit::RateLimiter;

pub struct AppState {
    pub store: Store,
    pub config: AppConfig,
    pub coordinator: Coordinator,
    pub clock: Arc<dyn Clock>,
    pub bookings: BookingExecutor,
    pub allocator: SlotAllocator,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store, coordinator: Coordinator, clock: Arc<dyn Clock>) -> Self {
        let locks = LockCoordinator::new(coordinator.clone());
        let bookings = BookingExecutor::new(store.clone(), locks.clone(), clock.clone(), config.lock_ttl);
        let allocator = SlotAllocator::new(
            store.clone(),
            locks,
            clock.clone(),
            config.lock_ttl,
            config.capacity_percent,
        );
        let rate_limiter = RateLimiter::new(
            coordinator.clone(),
            config.rate_limit_requests,
            config.rate_limit_window,
        );

        Self {
            store,
            config,
            coordinator,
            clock,
            bookings,
            allocator,
            rate_limiter,
        }
    }
}
