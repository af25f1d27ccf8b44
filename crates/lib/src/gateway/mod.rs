//! Gateway: HTTP server for the channel webhook and liveness probes.
//!
//! `POST /webhook` (and `POST /`) runs one relay turn per inbound message and answers
//! with TwiML. `GET /`, `GET /health`, and `GET /ping` are static status endpoints.

mod server;

pub use server::{build_router, run_gateway, GatewayState, SERVICE_NAME};
