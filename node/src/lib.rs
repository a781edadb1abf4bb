// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod network;
pub mod registry;
pub mod replication;
pub mod server;
pub mod telemetry;
pub mod txlog;
