//! The Rust SDK for OfferKit, a service that matches user queries with relevant sponsored offers.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that sends a user's query to OfferKit on behalf of your
//! application (an *agent*) and returns the matching [`Offer`]s. Agents authenticate with an agent
//! id and secret passed to [`ClientConfig`].
//!
//! By default the client also verifies the credentials in the background and keeps probing the
//! API every 30 seconds. Use [`Client::is_ready`] or [`Client::get_connection_status`] to see
//! the outcome, or register [`ClientConfig::on_verified`]/[`ClientConfig::on_failed`] callbacks.
//! Background checks can be turned off with [`ClientConfig::health_check`].
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] struct. Every error carries an [`ErrorCode`], a
//! human-readable message and, when available, the underlying failure.
//!
//! Failures of background checks are never returned from any method. They are recorded in the
//! connection status and passed to the `on_failed` callback instead.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages with the `offerkit` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into SDK operations.
//!
//! # Examples
//!
//! Examples can be found in the `demos` directory of the `offerkit` crate repository.

#![warn(rustdoc::missing_crate_level_docs)]

mod client;
mod config;
mod connection_store;
mod error;
mod health;
mod models;
mod transport;

pub use client::Client;
pub use config::{ClientConfig, Environment, OnFailed, OnVerified};
pub use connection_store::ConnectionStatus;
pub use error::{ApiError, Error, ErrorCode, Result, TimeoutError};
pub use health::HealthCheckConfig;
pub use models::{Agent, ConnectionTestResult, Offer, OfferRequest, OfferResponse};
