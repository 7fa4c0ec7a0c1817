mod api;

pub use api::service as api;
