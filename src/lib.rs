//! Session recording lookup, source resolution, playback state and download
//! for the telehealth portal API.

pub mod auth;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod http;
pub mod logger;
pub mod probe;
pub mod progress;
pub mod recordings;
pub mod state;
