use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dumb_server::application::FixedResponder;
use dumb_server::config::Args;
use dumb_server::infrastructure::server_impl::server::{bind_listener, serve};
use dumb_server::AnyResult;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    run(Args::parse()).await
}

async fn run(args: Args) -> AnyResult<()> {
    let spec = args.load_response_spec()?;
    let responder = FixedResponder::new(spec);
    let listener = bind_listener(args.addr()).await?;

    tracing::info!(
        message = "Accepting requests.",
        addr = %listener.local_addr()?,
        status = responder.status_code().as_u16(),
        headers = responder.headers().keys_len(),
        body_len = responder.body().len()
    );

    serve(listener, Arc::new(responder), args.limits()).await
}
