//! Marketing automation service: customer segmentation by rule, simulated
//! campaign launches and funnel analytics over an SQLite store.

pub mod analytics;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod demo;
pub mod error;
pub mod events;
pub mod models;
pub mod rules;
pub mod simulation;
