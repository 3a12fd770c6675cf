//! Channels through which recorded activity leaves the driver.

pub mod log_ring;
