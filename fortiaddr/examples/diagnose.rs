//! Run the connectivity probe against the configured FortiGate.
//!
//! Useful when `address_book` cannot connect: reports whether the host
//! resolves, answers ping, and has its SSH port open.
//!
//! # Usage
//!
//! ```bash
//! FORTIGATE_HOST=192.168.1.99 FORTIGATE_USERNAME=admin FORTIGATE_PASSWORD=secret \
//!     cargo run --example diagnose
//! ```

use fortiaddr::Diagnostics;
use fortiaddr::transport::load_connection_config;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_connection_config();
    let info = config.as_ref().map(|c| c.info());

    let report = Diagnostics::default().diagnose(info.as_ref()).await;

    match &report.target {
        Some(target) => println!("Connection diagnostics for {}", target),
        None => println!("Connection diagnostics"),
    }
    println!("{}", "-".repeat(50));
    for (i, line) in report.results.iter().enumerate() {
        println!("{}. {}", i + 1, line);
    }

    if !report.success {
        std::process::exit(1);
    }
}
