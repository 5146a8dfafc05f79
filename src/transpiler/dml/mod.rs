//! DML statement builders.

pub mod delete;
pub mod insert;
pub mod select;
pub mod update;

pub(crate) use select::SelectPlan;
