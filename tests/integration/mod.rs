//! Integration tests for the collab coordination service and sync engine

mod coordination_http;
mod relay_protocol;
mod share_scenarios;
mod support;
