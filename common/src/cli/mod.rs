//! CLI policy shared by the generator binaries.

mod color;

pub use color::ColorWhen;
