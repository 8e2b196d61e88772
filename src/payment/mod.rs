//! Payment verification.
//!
//! A test is funded by a single confirmed transfer to the treasury. The
//! verifier turns that irreversible external event into a single-use
//! authorization: every check runs before anything is written, and the
//! durable signature record is the point of no return.

mod verifier;

pub use verifier::{PaymentRejection, PaymentVerifier, PaymentVerifierConfig, VerifiedPayment};
