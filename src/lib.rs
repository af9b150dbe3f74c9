#![deny(
    missing_copy_implementations,
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts
)]

pub mod config;
pub mod domain;

pub mod application;
pub mod infrastructure;

pub type AnyResult<T> = eyre::Result<T>;
