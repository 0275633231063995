//! One-shot client commands: `call`, `freeze` and `names`.

use super::{fail, resolver, runtime};
use crate::ui;
use farcall_types::config::NodeConfig;
use farcall_types::{Endpoint, InvokeError, InvokeResult, Value};
use farcall_wire::{capsule, remote, Locator};
use std::path::Path;

/// Parse the JSON argument text of `farcall call`. Absent means no arguments.
pub fn parse_args(text: Option<&str>) -> InvokeResult<Value> {
    match text {
        None => Ok(Value::Null),
        Some(text) => serde_json::from_str::<serde_json::Value>(text)
            .map(Value::from_json)
            .map_err(|e| InvokeError::InvalidArgument(format!("arguments are not JSON: {e}"))),
    }
}

/// Endpoint of a `//host[:port]` server locator.
pub fn server_endpoint(server: &str, default_port: u16) -> InvokeResult<Endpoint> {
    let not_a_server = || {
        InvokeError::InvalidArgument(format!(
            "'{server}' is not a server locator (expected //host[:port])"
        ))
    };
    let authority = server
        .strip_prefix("//")
        .ok_or_else(not_a_server)?
        .trim_end_matches('/');
    if authority.contains('/') {
        return Err(not_a_server());
    }
    match Locator::parse(Some(&format!("//{authority}/")), default_port)? {
        Locator::Registry { host, port, .. } => Ok(Endpoint::new(host, port)),
        _ => Err(not_a_server()),
    }
}

pub fn cmd_call(config: NodeConfig, locator: &str, method: &str, args: Option<&str>) {
    let args = match parse_args(args) {
        Ok(args) => args,
        Err(e) => fail("Invalid arguments", &e),
    };
    let rt = runtime();
    rt.block_on(async {
        let item = match resolver(&config).resolve(Some(locator)).await {
            Ok(item) => item,
            Err(e) => fail("Failed to resolve item", &e),
        };
        match item.invoke(Some(method), args).await {
            Ok(value) => {
                let json = value.to_json();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json).unwrap_or_else(|_| value.to_string())
                );
            }
            Err(e) => fail(&format!("{method} failed"), &e),
        }
    });
}

pub fn cmd_freeze(config: NodeConfig, locator: &str, file: &Path) {
    let rt = runtime();
    rt.block_on(async {
        let item = match resolver(&config).resolve(Some(locator)).await {
            Ok(item) => item,
            Err(e) => fail("Failed to resolve item", &e),
        };
        let written = std::fs::File::create(file)
            .map_err(InvokeError::from)
            .and_then(|out| capsule::encode(&*item, out).map_err(InvokeError::from));
        match written {
            Ok(()) => ui::success(&format!("Wrote capsule for {item} to {}", file.display())),
            Err(e) => fail("Failed to write capsule", &e),
        }
    });
}

pub fn cmd_names(config: NodeConfig, server: &str) {
    let endpoint = match server_endpoint(server, config.registry.port) {
        Ok(endpoint) => endpoint,
        Err(e) => fail("Invalid server locator", &e),
    };
    let rt = runtime();
    rt.block_on(async {
        let uptime = match remote::ping(&endpoint).await {
            Ok(uptime) => uptime,
            Err(e) => fail(&format!("Server {endpoint} is unreachable"), &e),
        };
        let names = match remote::list_names(&endpoint).await {
            Ok(names) => names,
            Err(e) => fail("Failed to list names", &e),
        };
        ui::section(&format!("{endpoint} (up {uptime}s)"));
        if names.is_empty() {
            ui::hint("No names bound");
        }
        for name in names {
            println!("  //{endpoint}/{name}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use farcall_types::ErrorClass;

    #[test]
    fn test_parse_args() {
        assert!(parse_args(None).unwrap().is_null());
        let args = parse_args(Some("[2, \"x\"]")).unwrap();
        assert_eq!(
            args.into_args(),
            vec![Value::Int(2), Value::Str("x".into())]
        );
        let err = parse_args(Some("[2,")).unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidArgument);
    }

    #[test]
    fn test_server_endpoint_defaults() {
        let endpoint = server_endpoint("//", 1099).unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 1099));

        let endpoint = server_endpoint("//gateway:4000", 1099).unwrap();
        assert_eq!(endpoint, Endpoint::new("gateway", 4000));

        let endpoint = server_endpoint("//gateway/", 1099).unwrap();
        assert_eq!(endpoint, Endpoint::new("gateway", 1099));
    }

    #[test]
    fn test_server_endpoint_rejects_other_locators() {
        let err = server_endpoint("farcall.Registry", 1099).unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidArgument);
        let err = server_endpoint("//gateway/main", 1099).unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidArgument);
        let err = server_endpoint("/srv/main.cap", 1099).unwrap_err();
        assert_eq!(err.class(), ErrorClass::InvalidArgument);
    }

    #[test]
    fn test_names_default_is_local_server() {
        let cli = Cli::parse_from(["farcall", "names"]);
        let Commands::Names { server } = cli.command else {
            panic!("expected names");
        };
        let endpoint = server_endpoint(&server, 1099).unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 1099));
    }
}
