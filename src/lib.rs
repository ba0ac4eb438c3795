pub mod candidate;
pub mod compose;
pub mod confluence;
pub mod engines;
pub mod error;
pub mod filter;
pub mod grading;
pub mod ledger;
pub mod logging;
pub mod modifiers;
pub mod pipeline;
pub mod state;
pub mod storage;
pub mod tier;
pub mod weights;
