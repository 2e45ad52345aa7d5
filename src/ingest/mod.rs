pub mod changes;
pub mod fetch;
pub mod markup;
pub mod parse;
pub mod pipeline;
#[cfg(test)]
mod tests;

pub use pipeline::Pipeline;
