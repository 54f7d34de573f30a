//! HTTP control surface: manual triggers, rescheduling, run and record history.

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;
