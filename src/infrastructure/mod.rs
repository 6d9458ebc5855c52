pub mod alarm;
pub mod block_store;
pub mod calendar_gateway;
pub mod config;
pub mod error;
pub mod webhook;
