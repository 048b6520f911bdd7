//! Repository implementations.

pub mod memory;

pub use memory::{
    InMemoryBookingRepository, InMemoryEventRepository, InMemoryVoucherRepository,
    InMemoryWaitlistRepository,
};
