//! Operational tools for AWS SSO profiles and S3 cold storage.
//!
//! This tool should be used from a command line and currently ships two
//! commands: `provision`, which writes SSO profiles (with VPC endpoint
//! overrides) into the AWS config file, and `migrate`, which moves objects
//! out of Glacier and back into the STANDARD storage class.
//!
//! Credentials must be provided via guidelines in the [AWS Documentation]
//! (https://docs.aws.amazon.com/cli/latest/userguide/cli-environment.html).
#[macro_use]
extern crate log as logger;

mod cli;
mod log;
mod types;
mod walker;

mod migrate;
mod provision;

#[tokio::main]
async fn main() -> types::UtilResult<()> {
    // build the CLI and grab all arguments
    let args = cli::build().get_matches();

    // initialize logging
    log::init(&args)?;

    // delegate to the cli mod
    cli::exec(&args).await
}
