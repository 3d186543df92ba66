//! `soapflow`: command-line front end for the soapflow SOAP client.
//!
//! Provides three subcommands:
//!
//! - **`info`** lists the operations and types a service declares.
//! - **`flatten`** resolves every import and prints one self-contained WSDL.
//! - **`call`** invokes an operation and prints the result as JSON.
//!
//! The WSDL argument may be an `http(s)://` or `file://` URL, a local path,
//! or `-` to read the document from stdin. Client options start from the
//! `SOAPFLOW_*` environment variables and are overridden by flags.

use std::io::{self, Read};
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Url;
use serde_json::Value;
use soapflow::{Document, Flattener, SoapVersion};
use soapflow_client::{Client, ClientOptions, DocumentSource, HttpClient, HttpLoader};
use tracing::debug;

/// soapflow: call SOAP services described by WSDL
#[derive(Parser)]
#[command(name = "soapflow", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the functions and types a service declares, in declaration order.
    Info {
        /// WSDL URL, local path, or `-` for stdin.
        wsdl: String,
    },

    /// Print the WSDL with every import inlined.
    Flatten {
        /// WSDL URL, local path, or `-` for stdin.
        wsdl: String,
    },

    /// Call an operation and print the result as JSON.
    ///
    /// Examples:
    ///   soapflow call http://localhost:8080/calc?wsdl Add --arg 1 --arg 2
    ///   soapflow call ./bank.wsdl getBank --arg '"12070000"' --soap12
    Call {
        /// WSDL URL, local path, or `-` for stdin.
        wsdl: String,

        /// Operation name.
        operation: String,

        /// A positional argument as JSON. Repeat for each argument.
        #[arg(long = "arg", value_name = "JSON")]
        args: Vec<String>,

        /// Post requests here instead of the address declared in the WSDL.
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,

        /// Use SOAP 1.2 instead of 1.1.
        #[arg(long)]
        soap12: bool,

        /// Give up on a request after this many seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soapflow=warn,soapflow_client=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let options =
        ClientOptions::from_env().unwrap_or_else(|e| fatal(&format!("configuration: {e}")));

    match cli.command {
        Command::Info { wsdl } => {
            let client = client(source(&wsdl), options);
            let functions = client.functions().await.unwrap_or_else(|e| fail(&e));
            let types = client.types().await.unwrap_or_else(|e| fail(&e));

            println!("functions:");
            for method in &functions {
                println!("  {method}");
            }
            println!("types:");
            for ty in &types {
                for line in ty.to_string().lines() {
                    println!("  {line}");
                }
            }
        }

        Command::Flatten { wsdl } => {
            let http = HttpClient::with_timeout(options.timeout)
                .unwrap_or_else(|e| fatal(&format!("HTTP client: {e}")));
            let flattener = Flattener::new(Arc::new(HttpLoader::new(http)));
            let flattened = match source(&wsdl) {
                DocumentSource::Location(location) => flattener.flatten(&location).await,
                DocumentSource::Inline(text) => {
                    let document = Document::inline(&text)
                        .unwrap_or_else(|e| fatal(&format!("stdin: {e}")));
                    flattener.flatten_document(document).await
                }
            };
            match flattened {
                Ok(document) => println!("{}", document.to_xml()),
                Err(e) => fail(&e),
            }
        }

        Command::Call {
            wsdl,
            operation,
            args,
            endpoint,
            soap12,
            timeout,
        } => {
            let args: Vec<Value> = args
                .iter()
                .map(|raw| {
                    serde_json::from_str(raw)
                        .unwrap_or_else(|e| fatal(&format!("invalid --arg {raw:?}: {e}")))
                })
                .collect();

            let mut options = options;
            if let Some(endpoint) = endpoint {
                options.endpoint = Some(endpoint);
            }
            if soap12 {
                options.soap_version = SoapVersion::V1_2;
            }
            if let Some(secs) = timeout {
                options.timeout = Some(Duration::from_secs(secs));
            }

            let client = client(source(&wsdl), options);
            let result = client.call(&operation, args).await.unwrap_or_else(|e| fail(&e));
            let rendered = serde_json::to_string_pretty(&result)
                .unwrap_or_else(|e| fatal(&format!("cannot render result: {e}")));
            println!("{rendered}");
        }
    }
}

fn client(source: DocumentSource, options: ClientOptions) -> Client {
    Client::new(None, source, options).unwrap_or_else(|e| fatal(&format!("HTTP client: {e}")))
}

/// Interpret the WSDL argument: `-` reads stdin, URLs pass through, anything
/// else is a local path.
fn source(wsdl: &str) -> DocumentSource {
    if wsdl == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .unwrap_or_else(|e| fatal(&format!("failed to read stdin: {e}")));
        debug!(bytes = buf.len(), "read WSDL from stdin");
        return DocumentSource::Inline(buf);
    }
    if Url::parse(wsdl).is_ok_and(|url| url.scheme().len() > 1) {
        debug!(location = %wsdl, "using WSDL location as given");
        return DocumentSource::Location(wsdl.to_string());
    }
    let path = Path::new(wsdl)
        .canonicalize()
        .unwrap_or_else(|e| fatal(&format!("failed to read {wsdl}: {e}")));
    let url = Url::from_file_path(&path)
        .unwrap_or_else(|_| fatal(&format!("cannot turn {} into a file URL", path.display())));
    debug!(path = %path.display(), location = %url, "resolved local WSDL path");
    DocumentSource::Location(url.to_string())
}

/// Print a failed operation to stderr and exit with code 1.
fn fail(err: &dyn std::fmt::Display) -> ! {
    eprintln!("soapflow: {err}");
    process::exit(1);
}

/// Print a usage error to stderr and exit with code 2.
fn fatal(msg: &str) -> ! {
    eprintln!("soapflow: {msg}");
    process::exit(2);
}
