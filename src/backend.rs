//! Implementations of [`Client`](crate::Client) and
//! [`ArtifactRepository`](crate::ArtifactRepository).

pub mod memory;
pub mod rest;
pub mod retry;
