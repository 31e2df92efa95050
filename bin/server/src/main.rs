//! Assessment Server Binary
//!
//! Runs on `BIND_ADDR` (default `0.0.0.0:8080`; see `ac_core::Config`).

#[tokio::main]
async fn main() {
    ac_core::init_logging();
    ac_server::run().await.unwrap();
}
