//! Runtime module: process boot for the CLI.

pub mod boot;
