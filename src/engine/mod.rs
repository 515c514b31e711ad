pub mod allocation;
pub mod availability;
pub mod dispatch;
pub mod eligibility;
pub mod intake;
pub mod offers;
pub mod queue;
pub mod scorecard;
pub mod scoring;
pub mod sweeper;
