//! Async client for the deepfake detection backend.
//!
//! Wraps the backend HTTP contract ([`api`]), streams uploads with
//! progress ([`upload`]), polls job status until a terminal state
//! ([`poller`]), and drives the sequential upload-and-poll pipeline over
//! a caller-owned queue ([`workflow`]). Completed jobs are collected in
//! a [`aggregator::ResultSet`].

pub mod aggregator;
pub mod api;
pub mod config;
pub mod events;
pub mod poller;
pub mod upload;
pub mod workflow;
