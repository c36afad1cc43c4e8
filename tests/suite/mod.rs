//! Integration test suite modules

mod access_flow;
mod api_guard;
mod persistence;
