// src/lib.rs

//! Coordinate extraction pipeline for scholarly full-text articles.

pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{AppError, Result};
