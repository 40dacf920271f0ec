//! Core domain types shared by every component.
//!
//! These mirror the persisted schema (§6.5) but are independent of sqlx —
//! repositories translate between this shape and the row shape they store.

mod file_lock;
mod learning;
mod metric;
mod review;
mod work_item;
mod worker;

pub use file_lock::FileLock;
pub use learning::Learning;
pub use metric::WorkerMetric;
pub use review::PrReview;
pub use work_item::{Priority, WorkItem, WorkItemStatus, WorkItemType};
pub use worker::{Worker, WorkerStatus};
