//! Canopy HTTP API Service.
//!
//! This crate provides the HTTP API for the Canopy retail backend, including:
//!
//! - Loyalty status, ledger, redemptions and quiz points
//! - Order accrual events from commerce backends
//! - Content personalization
//! - Admin console sessions, users and loyalty tools
//! - Compliance snapshots written back to the CMS
//!
//! # Authentication
//!
//! The service supports three authentication methods:
//!
//! 1. **Shopper JWTs** (HS256 bearer) - For the consumer app
//! 2. **Service API keys** - For order backends posting accruals
//! 3. **Admin sessions** - Cookie plus CSRF token, opened with the admin key

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod auth;
pub mod cache;
pub mod cms;
pub mod compliance_job;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod loyalty;
pub mod routes;
pub mod state;

pub use cache::TieredCache;
pub use cms::{ContentFixture, ContentSource, SanityClient, StaticContent};
pub use compliance_job::ComplianceJob;
pub use config::ServiceConfig;
pub use error::ApiError;
pub use loyalty::LoyaltyService;
pub use routes::create_router;
pub use state::AppState;
