pub mod allocation;
pub mod earning;
pub mod event;
pub mod offer;
pub mod task;
pub mod worker;
