//! The search problem handed from the node to the workers.

pub mod easy_block;
mod template;

pub use template::{BlockHeader, BlockMethod, JobTemplate, TemplateError, TemplateResult};

#[cfg(test)]
pub(crate) use template::test_packets;
