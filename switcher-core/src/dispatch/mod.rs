//! Request dispatch.

pub mod engine;
