//! Clap CLI definitions for farcall.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  farcall serve farcall.Registry            Serve a built-in item as 'main'
  farcall serve //gateway:1099/ --monitor   Re-serve a remote item, logging each call
  farcall registry --client-host 203.0.113.9
  farcall call //127.0.0.1:1099/registry get
  farcall call //host/ add '[2, 3]'         JSON arrays are positional arguments
  farcall freeze //host/main main.cap       Write a capsule for an item
  farcall names //host:1099                 List names bound on a server

\x1b[1;36mLocators:\x1b[0m
  //[host][:port]/[name]   name-table lookup (defaults: local host, 1099, main)
  /path/file               capsule file (searched in resource_roots, then ./)
  some.TypeName            built-in type
  https://host/file.cap    capsule fetched over HTTP(S) or file://";

/// farcall: call any exported item by method name.
#[derive(Parser)]
#[command(name = "farcall", version, about, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve an item and serve it under the name 'main'.
    Serve(ServeArgs),
    /// Run a discovery registry with multicast announcements and eviction.
    Registry(RegistryArgs),
    /// Resolve an item and invoke one of its methods.
    Call {
        /// Locator of the item.
        locator: String,
        /// Method name.
        method: String,
        /// Arguments as JSON (an array spreads into positional arguments).
        args: Option<String>,
    },
    /// Resolve an item and write its capsule to a file.
    Freeze {
        /// Locator of the item.
        locator: String,
        /// Output file.
        file: PathBuf,
    },
    /// List the names bound on a server.
    Names {
        /// Server locator, `//host[:port]`.
        #[arg(default_value = "//")]
        server: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Locator of the item to serve (default `///main`).
    pub locator: Option<String>,
    /// Host remote callers must dial.
    #[arg(long)]
    pub client_host: Option<String>,
    /// Port remote callers must dial (0 = the bound port).
    #[arg(long)]
    pub client_port: Option<u16>,
    /// Host to bind.
    #[arg(long)]
    pub local_host: Option<String>,
    /// Port to bind (0 = any free port).
    #[arg(long)]
    pub local_port: Option<u16>,
    /// Locator of a second item handed to the first through `setItem`.
    #[arg(long)]
    pub proxy_of: Option<String>,
    /// Log every call to the served item.
    #[arg(long)]
    pub monitor: bool,
}

#[derive(Args, Debug, Default)]
pub struct RegistryArgs {
    /// Host remote callers must dial.
    #[arg(long)]
    pub client_host: Option<String>,
}
