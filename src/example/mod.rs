#[allow(clippy::module_inception)]
mod example;

pub use example::run;
