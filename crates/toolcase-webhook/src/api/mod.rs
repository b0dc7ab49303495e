pub mod admission_review;
mod api_error;
pub(crate) mod handlers;
pub(crate) mod service;
pub(crate) mod state;

pub(crate) use api_error::ApiError;
