pub use error_chain::{ErrorChain, ErrorEntry};

mod error_chain;
