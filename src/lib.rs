//! Scan orchestration for Wapiti, OWASP ZAP, WhatWeb and search_vulns with a
//! single canonical finding model.

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod container;
pub mod db;
pub mod errors;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reporting;
pub mod scheduler;
pub mod session;
