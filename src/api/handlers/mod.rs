//! Route handlers.
//!
//! Public routes (`register`, `track`, `content`, `health`) sit next to the
//! `admin` tree; request helpers shared by both live in `utils`.

pub mod admin;
pub mod content;
pub mod health;
pub mod register;
pub mod track;
pub mod utils;

#[cfg(test)]
pub mod test_support;
