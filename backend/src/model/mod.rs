pub mod backbone;
pub mod error;
pub mod labels;
pub mod loader;
pub mod locator;
pub mod predict;
pub mod service;
