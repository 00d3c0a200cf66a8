//! The four strategy implementations.

mod baseline;
mod blue_green;
mod locking;
mod soft_delete;

pub use baseline::BaselineStrategy;
pub use blue_green::BlueGreenStrategy;
pub use locking::LockingStrategy;
pub use soft_delete::SoftDeleteStrategy;
