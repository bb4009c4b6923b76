pub mod cancellation;
pub mod catalog;
pub mod proposals;
pub mod requirements;
pub mod slots;
