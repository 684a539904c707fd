//! Wire models for the Cloud Storage JSON API.

mod bucket;
mod object;
mod service;

pub use bucket::*;
pub use object::*;
pub use service::*;
