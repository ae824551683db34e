pub mod clock;
pub mod config;
pub mod engine;
pub mod journal;
pub mod ledger;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod pricing;
pub mod sweeper;
pub mod wal;
