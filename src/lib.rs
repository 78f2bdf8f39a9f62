//! # Lexcapture (lead capture & consent registry)
//!
//! `lexcapture` backs the public contact form of a law practice and its small
//! admin back office.
//!
//! ## Registration
//!
//! `POST /register` validates the submitted lead (name, email, phone and an
//! optional CPF), verifies an hCaptcha token, applies fixed-window rate limits
//! per IP and per email, looks up a matching lawsuit record, stores a consent
//! record pinned to a hash of the accepted terms and answers with the case
//! number (or `"nao-encontrado"`).
//!
//! ## Rate limiting
//!
//! Limits are enforced by a Postgres-backed fixed-window counter shared by all
//! instances. The counter is updated with a single conditional upsert, so two
//! concurrent requests for the same key can never both be granted past the
//! threshold. If the database is unavailable the check falls back to an
//! in-process counter that is swept once per minute.
//!
//! ## Admin
//!
//! Admin routes are guarded by a shared secret presented as a bearer token or
//! the `admin_token` cookie. Attempts are limited per IP (5 per 15 minutes by
//! default) and every attempt lands in the audit log.

use std::{future::Future, pin::Pin};

pub mod api;
pub mod captcha;
pub mod cli;
pub mod cpf;
pub mod rate_limit;
pub mod storage;
pub mod terms;

/// Boxed future used at trait-object seams (stores, limiters, captcha).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
