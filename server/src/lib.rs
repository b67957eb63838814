//! SkillSwap Backend Library
//!
//! Core modules of the SkillSwap server: the swap lifecycle, the user
//! directory, notifications and the real-time relay.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod jobs;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod routes;
pub mod state;
pub mod store;
pub mod swaps;
pub mod users;
pub mod websocket;
