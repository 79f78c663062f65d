#![doc = "widget-publish-core: core logic library for widget-publish."]

//! This crate holds the publish workflow and everything it needs that is not
//! tied to a transport or a terminal: the credential and uploader contracts,
//! the zip archiver and the settings the workflow runs with.
//!
//! # Usage
//! Implement [`contract::CredentialProvider`] and [`contract::WidgetUploader`]
//! (or use the mocks exported under the `test-export-mocks` feature), then
//! drive a [`publisher::Publisher`].

pub mod archive;
pub mod config;
pub mod contract;
pub mod publisher;

pub use publisher::{PublishError, Publisher};
