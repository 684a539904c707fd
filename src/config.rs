//! Command-line and environment configuration.
//!
//! Everything the process reads from its environment is collected here into a
//! typed [`Config`] before any client is built; the endpoint logic itself
//! only ever sees an [`EndpointConfig`].

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::endpoint::{
    EndpointConfig, DEFAULT_EXTERNAL_URL, DEFAULT_PROJECT, DEFAULT_PUBLIC_HOST, DEFAULT_TIMEOUT,
};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "gcs-redirector")]
#[command(about = "Talk to a Cloud Storage emulator through redirected endpoints")]
#[command(version)]
pub struct Args {
    /// Emulator URL used for every API call.
    #[arg(long, env = "EXTERNAL_URL", default_value = DEFAULT_EXTERNAL_URL)]
    pub external_url: String,

    /// Host (and port) presented in object access URLs. Pass an empty value
    /// to derive it from the external URL instead.
    #[arg(long, env = "PUBLIC_HOST", default_value = DEFAULT_PUBLIC_HOST)]
    pub public_host: String,

    /// Skip TLS certificate validation.
    #[arg(long, env = "INSECURE_TLS")]
    pub insecure: bool,

    /// Project used for bucket listing and creation.
    #[arg(long, env = "GCS_PROJECT", default_value = DEFAULT_PROJECT)]
    pub project: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (errors only).
    #[arg(long, short = 's')]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operations offered by the command-line tool.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print every bucket, every object in it, and each object's contents.
    Walk,
    /// List buckets.
    Buckets,
    /// List the objects of a bucket.
    Objects {
        bucket: String,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print an object's contents.
    Cat {
        bucket: String,
        object: String,
        /// Check the contents against the object's MD5.
        #[arg(long)]
        verify: bool,
    },
    /// Print an object's public URL.
    Url { bucket: String, object: String },
    /// Upload a local file.
    Upload {
        bucket: String,
        object: String,
        file: PathBuf,
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
        /// Use a resumable session instead of a single multipart request.
        #[arg(long)]
        resumable: bool,
    },
    /// Delete an object.
    Delete { bucket: String, object: String },
    /// Create the test buckets and print their outputs as JSON.
    Provision,
    /// Change the external URL the emulator reports in object links.
    SetExternalUrl { url: String },
}

/// Process configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint the storage client is built from.
    pub endpoint: EndpointConfig,
    /// Enable debug logging.
    pub debug: bool,
    /// Errors only.
    pub silent: bool,
    /// Operation to run.
    pub command: Command,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            debug: false,
            silent: false,
            command: Command::Walk,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let public_host = Some(args.public_host).filter(|h| !h.trim().is_empty());
        Self {
            endpoint: EndpointConfig {
                internal_base_url: args.external_url,
                public_host,
                insecure_tls: args.insecure,
                project: args.project,
                timeout: Duration::from_secs(args.timeout_secs),
            },
            debug: args.debug,
            silent: args.silent,
            command: args.command.unwrap_or(Command::Walk),
        }
    }
}

impl Config {
    /// Parses the process arguments and environment.
    pub fn load() -> Self {
        Config::from(Args::parse())
    }
}
