// Certificate handling: parsing, persistence, acquisition and retry

pub mod acquire;
pub mod certificate;
pub mod retry;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use acquire::{CertificateAcquirer, CertificateSource};
pub use certificate::Certificate;
pub use retry::{RetryConfig, RetryPolicy};
pub use store::{CertificateStore, GroupSpec, Ownership};
