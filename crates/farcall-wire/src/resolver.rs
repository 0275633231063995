//! Item resolver: locator string → callable item.
//!
//! Locators are resolved by the first matching rule:
//!
//! 1. `//[host][:port]/[name]`: look `name` up in the name table of a
//!    running server (host defaults to the local host, port to 1099, name
//!    to `main`)
//! 2. `/path`: a capsule stored as a local resource or file
//! 3. no `:` at all: a type registered in this process, built with its
//!    no-argument constructor
//! 4. anything else: a URL whose body is a capsule

use crate::capsule;
use crate::dispatch::{Dispatcher, Reflect};
use crate::remote;

use farcall_types::config::{DEFAULT_ITEM_NAME, DEFAULT_REGISTRY_PORT};
use farcall_types::{Endpoint, Invoke, InvokeError, InvokeResult, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Locator used when none is given.
pub const DEFAULT_LOCATOR: &str = "///main";

/// Host a registry-style locator with an empty host resolves to.
const LOCAL_HOST: &str = "127.0.0.1";

/// Apply the locator defaults: a missing locator is `///main`, and a
/// registry-style locator ending in `/` gets `main` appended.
pub fn normalize(locator: Option<&str>) -> String {
    match locator {
        None => DEFAULT_LOCATOR.to_string(),
        Some(l) if l.starts_with("//") && l.ends_with('/') => format!("{l}{DEFAULT_ITEM_NAME}"),
        Some(l) => l.to_string(),
    }
}

/// A parsed locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Name-table lookup on a running server.
    Registry { host: String, port: u16, name: String },
    /// Capsule stored under a local path.
    Resource(PathBuf),
    /// In-process type name.
    Type(String),
    /// Capsule fetched from a URL.
    Url(Url),
}

impl Locator {
    /// Parse a locator, after [`normalize`], using `default_port` for
    /// registry-style locators that omit one.
    pub fn parse(locator: Option<&str>, default_port: u16) -> InvokeResult<Locator> {
        let locator = normalize(locator);
        if let Some(rest) = locator.strip_prefix("//") {
            return parse_registry(rest, default_port);
        }
        if locator.starts_with('/') {
            return Ok(Locator::Resource(PathBuf::from(locator)));
        }
        if !locator.contains(':') {
            return Ok(Locator::Type(locator));
        }
        Url::parse(&locator)
            .map(Locator::Url)
            .map_err(|e| InvokeError::InvalidArgument(format!("malformed locator '{locator}': {e}")))
    }
}

fn parse_registry(rest: &str, default_port: u16) -> InvokeResult<Locator> {
    let (authority, name) = match rest.split_once('/') {
        Some((authority, name)) => (authority, name),
        None => (rest, ""),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| {
                InvokeError::InvalidArgument(format!("bad port in locator: '{port}'"))
            })?;
            (host, port)
        }
        Some((host, _)) => (host, default_port),
        None => (authority, default_port),
    };
    let host = if host.is_empty() { LOCAL_HOST } else { host };
    let name = if name.is_empty() { DEFAULT_ITEM_NAME } else { name };
    Ok(Locator::Registry {
        host: host.to_string(),
        port,
        name: name.to_string(),
    })
}

type Constructor = Arc<dyn Fn() -> InvokeResult<Arc<dyn Invoke>> + Send + Sync>;

/// Process-local types that `Type` locators can instantiate.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    constructors: HashMap<String, Constructor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a type name.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn() -> InvokeResult<Arc<dyn Invoke>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(name.to_string(), Arc::new(constructor));
    }

    /// Register a reflective type built with `Default`.
    pub fn register_reflective<T: Reflect + Default>(&mut self, name: &str) {
        self.register(name, || Ok(Arc::new(Dispatcher::reflect(T::default()))));
    }

    pub fn instantiate(&self, name: &str) -> InvokeResult<Arc<dyn Invoke>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| InvokeError::Resolution(format!("unknown type '{name}'")))?;
        constructor()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

/// Resolves locator strings to callable items.
pub struct Resolver {
    types: TypeRegistry,
    resource_roots: Vec<PathBuf>,
    registry_port: u16,
    http: reqwest::Client,
}

impl Resolver {
    pub fn new(types: TypeRegistry) -> Self {
        Self {
            types,
            resource_roots: Vec::new(),
            registry_port: DEFAULT_REGISTRY_PORT,
            http: reqwest::Client::new(),
        }
    }

    /// Directories searched, in order, for `/path` locators.
    pub fn with_resource_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.resource_roots = roots;
        self
    }

    /// Port used for registry-style locators that omit one.
    pub fn with_registry_port(mut self, port: u16) -> Self {
        self.registry_port = port;
        self
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Resolve `locator` (`None` means the default locator).
    pub async fn resolve(&self, locator: Option<&str>) -> InvokeResult<Arc<dyn Invoke>> {
        let parsed = Locator::parse(locator, self.registry_port)?;
        debug!(locator = ?parsed, "Resolving item");
        match parsed {
            Locator::Registry { host, port, name } => {
                remote::lookup(&Endpoint::new(host, port), &name).await
            }
            Locator::Resource(path) => {
                let bytes = self.read_resource(&path).await?;
                Ok(Arc::new(capsule::from_bytes(&bytes)?))
            }
            Locator::Type(name) => self.types.instantiate(&name),
            Locator::Url(url) => {
                let bytes = self.fetch(&url).await?;
                Ok(Arc::new(capsule::from_bytes(&bytes)?))
            }
        }
    }

    /// Resolve `locator` and hand it `item` through its `send` method.
    pub async fn send(&self, locator: &str, item: Arc<dyn Invoke>) -> InvokeResult<Value> {
        let target = self.resolve(Some(locator)).await?;
        target.invoke(Some("send"), Value::Item(item)).await
    }

    async fn read_resource(&self, path: &Path) -> InvokeResult<Vec<u8>> {
        let relative = path.strip_prefix("/").unwrap_or(path);
        let candidates = self
            .resource_roots
            .iter()
            .map(|root| root.join(relative))
            .chain([Path::new(".").join(relative), path.to_path_buf()]);
        for candidate in candidates {
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                debug!(path = %candidate.display(), "Loading capsule resource");
                return Ok(tokio::fs::read(&candidate).await?);
            }
        }
        Err(InvokeError::NotFound(format!(
            "no resource at '{}'",
            path.display()
        )))
    }

    async fn fetch(&self, url: &Url) -> InvokeResult<Vec<u8>> {
        match url.scheme() {
            "http" | "https" => {
                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| InvokeError::Connectivity(format!("fetching {url}: {e}")))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(InvokeError::Connectivity(format!(
                        "fetching {url}: HTTP {status}"
                    )));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| InvokeError::Connectivity(format!("fetching {url}: {e}")))?;
                Ok(bytes.to_vec())
            }
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    InvokeError::InvalidArgument(format!("not a local file URL: {url}"))
                })?;
                tokio::fs::read(&path).await.map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => {
                        InvokeError::NotFound(format!("no file at '{}'", path.display()))
                    }
                    _ => e.into(),
                })
            }
            scheme => Err(InvokeError::Resolution(format!(
                "unsupported locator scheme '{scheme}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MethodTable;
    use crate::server::ItemServer;
    use farcall_types::{Addressing, ValueType};
    use std::fmt;

    #[derive(Default)]
    struct Motd;

    impl fmt::Display for Motd {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("motd")
        }
    }

    impl Reflect for Motd {
        fn methods() -> MethodTable<Self> {
            MethodTable::<Self>::new()
                .method("text", &[], |_, _| Ok(Value::from("be excellent")))
                .method("send", &[ValueType::Invoke], |_, args| {
                    Ok(Value::from(format!("got {}", args[0])))
                })
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(None), "///main");
        assert_eq!(normalize(Some("//host/")), "//host/main");
        assert_eq!(normalize(Some("//host/name")), "//host/name");
        assert_eq!(normalize(Some("/some/dir/")), "/some/dir/");
    }

    #[test]
    fn test_parse_registry_defaults() {
        let default = Locator::parse(None, 1099).unwrap();
        assert_eq!(default, Locator::parse(Some("///main"), 1099).unwrap());
        assert_eq!(
            default,
            Locator::Registry {
                host: "127.0.0.1".into(),
                port: 1099,
                name: "main".into()
            }
        );
        assert_eq!(
            Locator::parse(Some("//host/"), 1099).unwrap(),
            Locator::parse(Some("//host/main"), 1099).unwrap()
        );
        assert_eq!(
            Locator::parse(Some("//host:2000/svc"), 1099).unwrap(),
            Locator::Registry {
                host: "host".into(),
                port: 2000,
                name: "svc".into()
            }
        );
        assert_eq!(
            Locator::parse(Some("//host"), 7).unwrap(),
            Locator::Registry {
                host: "host".into(),
                port: 7,
                name: "main".into()
            }
        );
        assert!(Locator::parse(Some("//host:notaport/x"), 1099).is_err());
    }

    #[test]
    fn test_parse_other_rules() {
        assert_eq!(
            Locator::parse(Some("/capsules/clock.cap"), 1099).unwrap(),
            Locator::Resource(PathBuf::from("/capsules/clock.cap"))
        );
        assert_eq!(
            Locator::parse(Some("demo.Motd"), 1099).unwrap(),
            Locator::Type("demo.Motd".into())
        );
        assert!(matches!(
            Locator::parse(Some("https://example.net/item.cap"), 1099).unwrap(),
            Locator::Url(_)
        ));
    }

    #[tokio::test]
    async fn test_resolve_type() {
        let mut types = TypeRegistry::new();
        types.register_reflective::<Motd>("demo.Motd");
        let resolver = Resolver::new(types);

        let item = resolver.resolve(Some("demo.Motd")).await.unwrap();
        assert_eq!(item.to_string(), "motd");
        let err = resolver.resolve(Some("demo.Missing")).await.err().unwrap();
        assert!(err.is_resolution());
    }

    #[tokio::test]
    async fn test_resolve_registry_and_default_name() {
        let (server, _task) = ItemServer::start(Addressing::loopback().shared())
            .await
            .unwrap();
        server.bind("main", &server.export_reflect(Motd)).unwrap();
        let port = server.local_addr().port();
        let resolver = Resolver::new(TypeRegistry::new());

        let a = resolver
            .resolve(Some(&format!("//127.0.0.1:{port}/")))
            .await
            .unwrap();
        let b = resolver
            .resolve(Some(&format!("//127.0.0.1:{port}/main")))
            .await
            .unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(
            a.invoke(Some("text"), Value::Null).await.unwrap(),
            Value::from("be excellent")
        );

        let err = resolver
            .resolve(Some(&format!("//127.0.0.1:{port}/other")))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, InvokeError::NotFound(_)));

        // Default locator uses the resolver's registry port.
        let resolver = Resolver::new(TypeRegistry::new()).with_registry_port(port);
        let c = resolver.resolve(None).await.unwrap();
        assert_eq!(c.identity(), a.identity());
    }

    #[tokio::test]
    async fn test_resolve_resource_and_file_url() {
        let (server, _task) = ItemServer::start(Addressing::loopback().shared())
            .await
            .unwrap();
        let handle = server.export_reflect(Motd);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motd.cap");
        std::fs::write(&path, capsule::to_bytes(&handle).unwrap()).unwrap();

        let resolver =
            Resolver::new(TypeRegistry::new()).with_resource_roots(vec![dir.path().to_path_buf()]);
        let item = resolver.resolve(Some("/motd.cap")).await.unwrap();
        assert_eq!(item.identity(), handle.identity());

        let url = Url::from_file_path(&path).unwrap();
        let item = resolver.resolve(Some(url.as_str())).await.unwrap();
        assert_eq!(item.identity(), handle.identity());

        let err = resolver.resolve(Some("/nowhere.cap")).await.err().unwrap();
        assert!(matches!(err, InvokeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let resolver = Resolver::new(TypeRegistry::new());
        let err = resolver.resolve(Some("ftp://example.net/x")).await.err().unwrap();
        assert!(matches!(err, InvokeError::Resolution(_)));
    }

    #[tokio::test]
    async fn test_send_invokes_send_method() {
        let (server, _task) = ItemServer::start(Addressing::loopback().shared())
            .await
            .unwrap();
        server.bind("inbox", &server.export_reflect(Motd)).unwrap();
        let parcel = server.export_reflect(Motd);
        let resolver = Resolver::new(TypeRegistry::new());
        let locator = format!("//127.0.0.1:{}/inbox", server.local_addr().port());
        let got = resolver.send(&locator, Arc::new(parcel)).await.unwrap();
        assert_eq!(got, Value::from("got motd"));
    }
}
