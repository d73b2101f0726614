pub mod helpers;
pub mod memory;

pub use memory::MemoryRepos;
