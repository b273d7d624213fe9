//! CLI entry point for the fetcher tool.

use std::io::{self, IsTerminal};

use anyhow::{Context, Result, bail};
use clap::Parser;
use fetcher_core::auth::Credential;
use fetcher_core::client::{Client, DownloadOptions, RequestOptions, UploadOptions, UploadPayload};
use fetcher_core::config::{ClientConfig, ServerTrustPolicy};
use fetcher_core::request::{ParamValue, Parameters};
use fetcher_core::response::{ResponseFormat, ResponseValue};
use tracing::{debug, info};

mod cli;
mod progress;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = ClientConfig {
        base_url: args.base_url.clone(),
        request_timeout_secs: args.timeout,
        server_trust: if args.insecure {
            ServerTrustPolicy::AcceptAny
        } else {
            ServerTrustPolicy::Verify
        },
        response_format: if args.text {
            ResponseFormat::Text
        } else {
            ResponseFormat::Json
        },
        ..ClientConfig::default()
    };
    let client = Client::new(&config).context("failed to create HTTP client")?;

    let mut options = RequestOptions::default();
    for (name, value) in &args.headers {
        options = options.header(name, value);
    }
    if let Some(user) = &args.user {
        let Some((name, password)) = user.split_once(':') else {
            bail!("--user expects USER:PASSWORD");
        };
        options = options.credential(Credential::new(name, password));
    }
    let parameters = parameters_from_pairs(&args.data);
    let show_progress = !args.quiet && io::stderr().is_terminal();

    let handle = if let Some(dir) = &args.download {
        let mut download = DownloadOptions {
            parameters,
            method: args.method,
            request: options,
            ..DownloadOptions::default()
        }
        .destination(dir);
        if let Some(bar) = progress::transfer_bar(show_progress) {
            download = download.progress(progress::hook(bar));
        }
        client.download(&args.url, download)
    } else if let Some(file) = &args.upload {
        let mut upload = UploadOptions {
            parameters,
            method: args.method,
            request: options,
            ..UploadOptions::default()
        };
        if let Some(bar) = progress::transfer_bar(show_progress) {
            upload = upload.progress(progress::hook(bar));
        }
        client.upload(&args.url, UploadPayload::File(file.clone()), upload)
    } else {
        client.request(args.method, &args.url, parameters, options)
    };

    let outcome = handle.await;
    client.close().await;
    let response = outcome.with_context(|| format!("{} {} failed", args.method, args.url))?;

    info!(status = response.head.status, url = %response.head.url, "request complete");
    match response.value {
        ResponseValue::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        ResponseValue::Text(text) => println!("{text}"),
        ResponseValue::File(path) => {
            if !response.head.is_success() {
                bail!(
                    "HTTP {} for {}; response body saved to {}",
                    response.head.status,
                    response.head.url,
                    path.display()
                );
            }
            println!("{}", path.display());
        }
    }

    Ok(())
}

/// Builds parameters from `key=value` pairs. A `key[]` name appends to a list.
fn parameters_from_pairs(pairs: &[(String, String)]) -> Parameters {
    let mut parameters = Parameters::new();
    for (key, value) in pairs {
        if let Some(list_key) = key.strip_suffix("[]") {
            let entry = parameters
                .entry(list_key.to_string())
                .or_insert_with(|| ParamValue::List(Vec::new()));
            if let ParamValue::List(items) = entry {
                items.push(ParamValue::from(value.as_str()));
            } else {
                *entry = ParamValue::from(vec![value.as_str()]);
            }
        } else {
            parameters.insert(key.clone(), ParamValue::from(value.as_str()));
        }
    }
    parameters
}
