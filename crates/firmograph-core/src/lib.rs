//! Core types, normalization rules and the stage pipeline for Firmograph.
//!
//! This crate knows nothing about SQL. Storage backends implement
//! [`store::NormalizedStore`]; the [`pipeline::Pipeline`] drives any of them
//! through the extract → normalize → resolve/link/detail stages and gates the
//! destructive schema finalization behind [`pipeline::StagesComplete`].

// Native `async fn` in traits; the store trait spells out `Send` futures.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod error;
pub mod normalize;
pub mod payload;
pub mod pipeline;
pub mod staging;
pub mod store;

pub use error::{Error, Result};
