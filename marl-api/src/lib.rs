pub mod builders;
pub mod hooks;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
