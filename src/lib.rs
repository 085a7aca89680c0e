//! Library exports for the URL shortener
//!
//! The registry, resolver and their collaborators are usable on their own;
//! `route` and `handler` put an HTTP surface in front of them.

pub mod clipboard;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod handler;
pub mod location;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod route;
pub mod shortcode;
pub mod validation;
