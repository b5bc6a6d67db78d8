//! Integration tests for feedvault-pds
//!
//! Uses wiremock to simulate a personal data server and verifies
//! end-to-end behavior of the request executor (including nonce
//! challenges) and the record dispatcher.

mod common;

mod test_dispatcher;
mod test_executor;
