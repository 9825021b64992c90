//! Ansible binary module: `azure_image_capture <args-file>`.
//!
//! Reads the module arguments from a JSON file, captures the VM and prints
//! the result object on stdout. Logs go to stderr, filtered by `RUST_LOG`.

use azure_image_capture::module::{self, ModuleResponse};
use azure_image_capture::{ComputeProvider, Environment, ModuleParams};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Capture an Azure VM into a VHD image.
#[derive(Debug, Parser)]
#[command(name = "azure_image_capture", version, about)]
struct Args {
    /// JSON file holding the module arguments
    args_file: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();

    let args = Args::parse();
    azure_image_capture::init();

    let response = match ModuleParams::from_file(&args.args_file).await {
        Ok(params) => {
            module::run(ComputeProvider::Azure, &params, &Environment::from_process()).await
        }
        Err(e) => ModuleResponse::failure(format!(
            "failed to read module arguments from {}: {}",
            args.args_file.display(),
            e
        )),
    };

    println!("{}", response.to_json());

    if response.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
