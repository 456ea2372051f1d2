//! # shutter_core
//!
//! Core domain logic for Shutter: authentication, the refresh-token store,
//! GitHub federation, and database lifecycle support shared by the API
//! crate and the server binary.

pub mod auth;
pub mod db;
pub mod migrate;
pub mod models;
pub mod oauth;
pub mod uuid;
