pub mod api;
pub mod aws;
pub mod document;
