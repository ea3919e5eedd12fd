// src/lib.rs
//! Forwards AWS-delivered log events (bucket objects, log-group
//! subscriptions, stream records, and their queue/topic/bridge wrappers) to
//! a push endpoint or an OTLP collector.

pub mod batch;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod event;
pub mod handler;
pub mod labels;
pub mod source;
pub mod timestamp;

pub use client::{build_client, DeliveryClient};
pub use config::Config;
pub use error::ForwardError;
pub use handler::InvocationContext;
