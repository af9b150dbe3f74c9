use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use http::StatusCode;

use crate::domain::response_spec::ResponseSpec;
use crate::infrastructure::server_impl::server::ConnectionLimits;
use crate::AnyResult;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "HTTP server that answers every request with the same response",
    long_about = None
)]
pub struct Args {
    /// The TCP port the server listens on
    #[arg(long, env = "DUMB_SERVER_PORT", default_value_t = 7979)]
    pub port: u16,

    /// The address the server binds to
    #[arg(long, env = "DUMB_SERVER_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// The HTTP status code returned with every request (200-999, 1xx isn't a final answer)
    #[arg(
        long = "sc",
        env = "DUMB_SERVER_STATUS_CODE",
        default_value = "200",
        value_parser = parse_status_code
    )]
    pub status_code: StatusCode,

    /// A file containing the response to return with every request
    #[arg(long = "resp", env = "DUMB_SERVER_RESPONSE_FILE")]
    pub response_file: Option<PathBuf>,

    /// Seconds to wait for request data, idle keep-alive connections included
    #[arg(long, default_value_t = 10)]
    pub read_timeout: u64,

    /// Seconds allowed for writing a response
    #[arg(long, default_value_t = 10)]
    pub write_timeout: u64,

    /// Largest accepted request line plus headers, in bytes
    #[arg(long, default_value_t = 1 << 20)]
    pub max_header_bytes: usize,
}

fn parse_status_code(value: &str) -> Result<StatusCode, String> {
    let code = value
        .parse::<u16>()
        .map_err(|_| format!("`{value}` is not a number"))?;
    match StatusCode::from_u16(code) {
        Ok(status_code) if !status_code.is_informational() => Ok(status_code),
        _ => Err(format!("`{code}` is not between 200 and 999")),
    }
}

impl Args {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            read_timeout: Duration::from_secs(self.read_timeout),
            write_timeout: Duration::from_secs(self.write_timeout),
            max_header_bytes: self.max_header_bytes,
        }
    }

    /// Reads `--resp`, or falls back to the built-in response.
    pub fn load_response_spec(&self) -> AnyResult<ResponseSpec> {
        match &self.response_file {
            Some(path) => ResponseSpec::from_path(self.status_code, path)
                .wrap_err_with(|| format!("failed to read response file {}", path.display())),
            None => Ok(ResponseSpec::default_response(self.status_code)),
        }
    }
}
