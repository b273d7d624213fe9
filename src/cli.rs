//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use fetcher_core::request::Method;

/// Issue an HTTP request, download a file or upload a body.
///
/// Prints the decoded response (JSON pretty-printed) or the saved path.
#[derive(Parser, Debug)]
#[command(name = "fetcher")]
#[command(author, version, about)]
pub struct Args {
    /// HTTP method: GET, HEAD, DELETE, POST or PUT
    pub method: Method,

    /// Absolute URL, or a path resolved against --base-url
    pub url: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Request parameter as key=value (repeatable; `key[]=v` appends to a list)
    #[arg(short = 'd', long = "data", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub data: Vec<(String, String)>,

    /// Extra header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Save the response body into this directory
    #[arg(long, value_name = "DIR", conflicts_with = "upload")]
    pub download: Option<PathBuf>,

    /// Send this file as the request body
    #[arg(long, value_name = "FILE")]
    pub upload: Option<PathBuf>,

    /// Base URL relative paths are resolved against
    #[arg(long)]
    pub base_url: Option<String>,

    /// Request timeout in seconds (1-3600)
    #[arg(short = 't', long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: u64,

    /// Credential for authentication challenges, as user:password
    #[arg(short = 'u', long, value_name = "USER:PASSWORD")]
    pub user: Option<String>,

    /// Decode the response as text instead of JSON
    #[arg(long)]
    pub text: bool,

    /// Accept any server certificate (test servers only)
    #[arg(long)]
    pub insecure: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected \"Name: value\", got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in `{raw}`"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
