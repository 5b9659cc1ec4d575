pub mod config;
pub mod web;
