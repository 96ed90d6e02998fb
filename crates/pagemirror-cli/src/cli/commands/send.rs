//! Single-request commands: send one control line, print the reply.

use anyhow::Result;
use pagemirror_core::control::Request;

use crate::cli::control_socket;

pub async fn run_send(request: Request) -> Result<()> {
    let reply = control_socket::send_request(&request).await?;
    control_socket::print_reply(&reply);
    Ok(())
}
