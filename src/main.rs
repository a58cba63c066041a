// src/main.rs

use teuthology::{cli, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run(cli::parse()).await {
        eprintln!("teuthology error: {err}");
        std::process::exit(err.exit_code());
    }
}
