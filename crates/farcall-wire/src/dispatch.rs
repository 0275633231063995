//! Generic dispatcher.
//!
//! A [`Dispatcher`] wraps one target and exposes the single [`Invoke`]
//! contract for it. Targets come in two variants, decided once when the
//! target is wrapped:
//!
//! - **native**: the target already implements [`Invoke`]; calls are
//!   forwarded unchanged, including a missing method name
//! - **reflective**: the target implements [`Reflect`] and publishes a
//!   [`MethodTable`]; a call resolves the method whose declared parameter
//!   types exactly equal the runtime types of the arguments
//!
//! Any item argument has runtime type [`ValueType::Invoke`], whatever its
//! concrete type, so a local implementation and a remote proxy both match a
//! parameter declared as `Invoke`.

use async_trait::async_trait;
use farcall_types::value::arg_types;
use farcall_types::{Identity, Invoke, InvokeError, InvokeResult, RemoteRef, Value, ValueType};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Future returned by a method body.
pub type MethodFuture = BoxFuture<'static, InvokeResult<Value>>;

type MethodBody<T> = Arc<dyn Fn(Arc<T>, Vec<Value>) -> MethodFuture + Send + Sync>;

/// Methods of a reflective target, keyed by name and exact parameter types.
pub struct MethodTable<T> {
    methods: HashMap<(String, Vec<ValueType>), MethodBody<T>>,
}

impl<T: Send + Sync + 'static> MethodTable<T> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Add a synchronous method.
    pub fn method<F>(mut self, name: &str, params: &[ValueType], body: F) -> Self
    where
        F: Fn(&T, Vec<Value>) -> InvokeResult<Value> + Send + Sync + 'static,
    {
        let body: MethodBody<T> = Arc::new(move |target: Arc<T>, args: Vec<Value>| {
            futures::future::ready(body(&target, args)).boxed()
        });
        self.methods.insert((name.to_string(), params.to_vec()), body);
        self
    }

    /// Add an asynchronous method. The body receives a shared handle to the target.
    pub fn async_method<F, Fut>(mut self, name: &str, params: &[ValueType], body: F) -> Self
    where
        F: Fn(Arc<T>, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InvokeResult<Value>> + Send + 'static,
    {
        let body: MethodBody<T> =
            Arc::new(move |target: Arc<T>, args: Vec<Value>| body(target, args).boxed());
        self.methods.insert((name.to_string(), params.to_vec()), body);
        self
    }

    /// Whether a method with exactly this signature exists.
    pub fn contains(&self, name: &str, params: &[ValueType]) -> bool {
        self.lookup(name, params).is_some()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    fn lookup(&self, name: &str, params: &[ValueType]) -> Option<&MethodBody<T>> {
        self.methods.get(&(name.to_string(), params.to_vec()))
    }
}

impl<T: Send + Sync + 'static> Default for MethodTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A type whose methods can be called by name.
///
/// Every reflective target also answers `toString()` with its `Display`
/// form and `hashCode()` with its identity hash, unless its table defines
/// those signatures itself.
///
/// Name the table's type up front so the method closures can infer their
/// receiver:
///
/// ```
/// use farcall_types::{Value, ValueType};
/// use farcall_wire::{ArgsExt, MethodTable, Reflect};
/// use std::fmt;
///
/// struct Adder;
///
/// impl fmt::Display for Adder {
///     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
///         f.write_str("adder")
///     }
/// }
///
/// impl Reflect for Adder {
///     fn methods() -> MethodTable<Self> {
///         MethodTable::<Self>::new().method(
///             "add",
///             &[ValueType::Int, ValueType::Int],
///             |_, args| Ok(Value::Int(args.int_at(0)? + args.int_at(1)?)),
///         )
///     }
/// }
///
/// assert!(Adder::methods().contains("add", &[ValueType::Int, ValueType::Int]));
/// ```
pub trait Reflect: fmt::Display + Send + Sync + Sized + 'static {
    fn methods() -> MethodTable<Self>;
}

/// Object-safe view of a reflective target and its table.
trait Resolve: fmt::Display + Send + Sync {
    fn call(&self, method: &str, args: Vec<Value>) -> InvokeResult<MethodFuture>;
    fn identity(&self) -> Identity;
}

struct Reflected<T> {
    target: Arc<T>,
    table: MethodTable<T>,
}

impl<T: Reflect> fmt::Display for Reflected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.target.fmt(f)
    }
}

impl<T: Reflect> Resolve for Reflected<T> {
    fn call(&self, method: &str, args: Vec<Value>) -> InvokeResult<MethodFuture> {
        let types = arg_types(&args)?;
        if let Some(body) = self.table.lookup(method, &types) {
            return Ok(body(Arc::clone(&self.target), args));
        }
        match (method, types.is_empty()) {
            ("toString", true) => {
                let text = self.target.to_string();
                Ok(futures::future::ready(Ok(Value::Str(text))).boxed())
            }
            ("hashCode", true) => {
                let hash = self.identity().hash_code() as i64;
                Ok(futures::future::ready(Ok(Value::Int(hash))).boxed())
            }
            _ => Err(InvokeError::NoSuchMethod(signature(method, &types))),
        }
    }

    fn identity(&self) -> Identity {
        Identity::of(&*self.target)
    }
}

fn signature(method: &str, types: &[ValueType]) -> String {
    let params: Vec<String> = types.iter().map(ToString::to_string).collect();
    format!("{method}({})", params.join(", "))
}

/// The two target variants, tagged once per wrap.
#[derive(Clone)]
pub enum Target {
    Native(Arc<dyn Invoke>),
    Reflective(Arc<ResolveTarget>),
}

/// Opaque reflective target, produced by [`Target::reflect`].
pub struct ResolveTarget(Box<dyn Resolve>);

impl Target {
    /// A target that implements the call contract itself.
    pub fn native(item: Arc<dyn Invoke>) -> Self {
        Target::Native(item)
    }

    /// A target called through its method table.
    pub fn reflect<T: Reflect>(target: T) -> Self {
        Self::reflect_shared(Arc::new(target))
    }

    /// Like [`Target::reflect`], for a target the caller keeps a handle to.
    pub fn reflect_shared<T: Reflect>(target: Arc<T>) -> Self {
        let reflected = Reflected {
            target,
            table: T::methods(),
        };
        Target::Reflective(Arc::new(ResolveTarget(Box::new(reflected))))
    }

    fn identity(&self) -> Identity {
        match self {
            Target::Native(item) => item.identity(),
            Target::Reflective(r) => r.0.identity(),
        }
    }
}

impl From<Arc<dyn Invoke>> for Target {
    fn from(item: Arc<dyn Invoke>) -> Self {
        Target::Native(item)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Native(item) => item.fmt(f),
            Target::Reflective(r) => r.0.fmt(f),
        }
    }
}

/// Uniform call surface over one target.
///
/// The dispatcher holds no per-call state; concurrent calls go straight to
/// the target, which guards its own critical sections. Equality, hashing and
/// the string form all delegate to the target.
#[derive(Clone)]
pub struct Dispatcher {
    target: Target,
}

impl Dispatcher {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    /// Shorthand for wrapping a reflective target.
    pub fn reflect<T: Reflect>(target: T) -> Self {
        Self::new(Target::reflect(target))
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}

#[async_trait]
impl Invoke for Dispatcher {
    async fn invoke(&self, method: Option<&str>, args: Value) -> InvokeResult<Value> {
        match &self.target {
            Target::Native(item) => item.invoke(method, args).await,
            Target::Reflective(r) => {
                let method = method.ok_or_else(|| {
                    InvokeError::InvalidArgument("method argument cannot be null".to_string())
                })?;
                r.0.call(method, args.into_args())?.await
            }
        }
    }

    fn identity(&self) -> Identity {
        self.target.identity()
    }

    fn remote_ref(&self) -> Option<RemoteRef> {
        match &self.target {
            Target::Native(item) => item.remote_ref(),
            Target::Reflective(_) => None,
        }
    }
}

impl fmt::Display for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.target.fmt(f)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("target", &self.to_string())
            .field("identity", &self.identity())
            .finish()
    }
}

impl PartialEq for Dispatcher {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Dispatcher {}

impl Hash for Dispatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// Typed access to positional arguments inside method bodies.
pub trait ArgsExt {
    fn value_at(&self, index: usize) -> InvokeResult<&Value>;
    fn bool_at(&self, index: usize) -> InvokeResult<bool>;
    fn int_at(&self, index: usize) -> InvokeResult<i64>;
    fn float_at(&self, index: usize) -> InvokeResult<f64>;
    fn str_at(&self, index: usize) -> InvokeResult<&str>;
    fn item_at(&self, index: usize) -> InvokeResult<Arc<dyn Invoke>>;
}

impl ArgsExt for [Value] {
    fn value_at(&self, index: usize) -> InvokeResult<&Value> {
        self.get(index)
            .ok_or_else(|| InvokeError::InvalidArgument(format!("missing argument {index}")))
    }

    fn bool_at(&self, index: usize) -> InvokeResult<bool> {
        self.value_at(index)?
            .as_bool()
            .ok_or_else(|| mismatch(index, ValueType::Bool))
    }

    fn int_at(&self, index: usize) -> InvokeResult<i64> {
        self.value_at(index)?
            .as_int()
            .ok_or_else(|| mismatch(index, ValueType::Int))
    }

    fn float_at(&self, index: usize) -> InvokeResult<f64> {
        self.value_at(index)?
            .as_float()
            .ok_or_else(|| mismatch(index, ValueType::Float))
    }

    fn str_at(&self, index: usize) -> InvokeResult<&str> {
        self.value_at(index)?
            .as_str()
            .ok_or_else(|| mismatch(index, ValueType::Str))
    }

    fn item_at(&self, index: usize) -> InvokeResult<Arc<dyn Invoke>> {
        self.value_at(index)?
            .as_item()
            .cloned()
            .ok_or_else(|| mismatch(index, ValueType::Invoke))
    }
}

fn mismatch(index: usize, expected: ValueType) -> InvokeError {
    InvokeError::InvalidArgument(format!("argument {index} is not {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Reflective test target: a counter with overloaded methods.
    struct Counter {
        total: AtomicI64,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                total: AtomicI64::new(0),
            }
        }

        fn add(&self, n: i64) -> i64 {
            self.total.fetch_add(n, Ordering::SeqCst) + n
        }
    }

    impl fmt::Display for Counter {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Counter({})", self.total.load(Ordering::SeqCst))
        }
    }

    impl Reflect for Counter {
        fn methods() -> MethodTable<Self> {
            MethodTable::<Self>::new()
                .method("add", &[ValueType::Int], |c, args| {
                    Ok(Value::Int(c.add(args.int_at(0)?)))
                })
                .method("add", &[ValueType::Int, ValueType::Int], |c, args| {
                    Ok(Value::Int(c.add(args.int_at(0)? + args.int_at(1)?)))
                })
                .method("total", &[], |c, _| {
                    Ok(Value::Int(c.total.load(Ordering::SeqCst)))
                })
                .method("fail", &[ValueType::Str], |_, args| {
                    Err(InvokeError::application(args.str_at(0)?))
                })
                .method("describe", &[ValueType::Invoke], |_, args| {
                    Ok(Value::Str(args.item_at(0)?.to_string()))
                })
                .async_method("later", &[ValueType::Int], |c, args| async move {
                    tokio::task::yield_now().await;
                    Ok(Value::Int(c.add(args.int_at(0)?)))
                })
        }
    }

    /// Native target that records what it was called with.
    struct Recorder;

    impl fmt::Display for Recorder {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("recorder")
        }
    }

    #[async_trait]
    impl Invoke for Recorder {
        async fn invoke(&self, method: Option<&str>, args: Value) -> InvokeResult<Value> {
            Ok(Value::List(vec![Value::from(method), args]))
        }
    }

    /// A second, unrelated native implementation.
    struct Other;

    impl fmt::Display for Other {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("other")
        }
    }

    #[async_trait]
    impl Invoke for Other {
        async fn invoke(&self, _method: Option<&str>, _args: Value) -> InvokeResult<Value> {
            Ok(Value::Null)
        }
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut h = DefaultHasher::new();
        value.hash(&mut h);
        h.finish()
    }

    #[tokio::test]
    async fn test_reflective_call_matches_direct_call() {
        let direct = Counter::new();
        let expected = direct.add(5);

        let d = Dispatcher::reflect(Counter::new());
        let got = d.invoke(Some("add"), Value::from(5)).await.unwrap();
        assert_eq!(got, Value::Int(expected));
    }

    #[tokio::test]
    async fn test_overload_selected_by_arity() {
        let d = Dispatcher::reflect(Counter::new());
        let got = d
            .invoke(Some("add"), Value::List(vec![Value::from(2), Value::from(3)]))
            .await
            .unwrap();
        assert_eq!(got, Value::Int(5));
        let total = d.invoke(Some("total"), Value::Null).await.unwrap();
        assert_eq!(total, Value::Int(5));
    }

    #[tokio::test]
    async fn test_no_widening() {
        let d = Dispatcher::reflect(Counter::new());
        let err = d.invoke(Some("add"), Value::from(1.0)).await.unwrap_err();
        assert_eq!(err, InvokeError::NoSuchMethod("add(Float)".into()));
        let err = d.invoke(Some("add"), Value::from("1")).await.unwrap_err();
        assert!(matches!(err, InvokeError::NoSuchMethod(_)));
    }

    #[tokio::test]
    async fn test_unknown_method_not_found() {
        let d = Dispatcher::reflect(Counter::new());
        let err = d.invoke(Some("explode"), Value::Null).await.unwrap_err();
        assert_eq!(err, InvokeError::NoSuchMethod("explode()".into()));
    }

    #[tokio::test]
    async fn test_null_method_rejected_before_resolution() {
        let d = Dispatcher::reflect(Counter::new());
        let err = d.invoke(None, Value::from(1)).await.unwrap_err();
        assert!(matches!(err, InvokeError::InvalidArgument(_)));
        let err = d.invoke(None, Value::Null).await.unwrap_err();
        assert!(matches!(err, InvokeError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_native_forwards_unchanged() {
        let d = Dispatcher::new(Target::native(Arc::new(Recorder)));
        let got = d.invoke(None, Value::from(9)).await.unwrap();
        assert_eq!(got, Value::List(vec![Value::Null, Value::Int(9)]));
        let got = d.invoke(Some("x"), Value::Null).await.unwrap();
        assert_eq!(got, Value::List(vec![Value::from("x"), Value::Null]));
    }

    #[tokio::test]
    async fn test_application_error_propagates_verbatim() {
        let d = Dispatcher::reflect(Counter::new());
        let err = d.invoke(Some("fail"), Value::from("boom")).await.unwrap_err();
        assert_eq!(err, InvokeError::Application("boom".into()));
    }

    #[tokio::test]
    async fn test_any_capability_matches_invoke_param() {
        let d = Dispatcher::reflect(Counter::new());
        let a: Arc<dyn Invoke> = Arc::new(Recorder);
        let b: Arc<dyn Invoke> = Arc::new(Other);
        let c: Arc<dyn Invoke> = Arc::new(Dispatcher::reflect(Counter::new()));
        for (item, expected) in [(a, "recorder"), (b, "other"), (c, "Counter(0)")] {
            let got = d.invoke(Some("describe"), Value::Item(item)).await.unwrap();
            assert_eq!(got, Value::from(expected));
        }
    }

    #[tokio::test]
    async fn test_async_method() {
        let d = Dispatcher::reflect(Counter::new());
        let got = d.invoke(Some("later"), Value::from(4)).await.unwrap();
        assert_eq!(got, Value::Int(4));
    }

    #[tokio::test]
    async fn test_builtin_to_string_and_hash_code() {
        let counter = Arc::new(Counter::new());
        counter.add(3);
        let d = Dispatcher::new(Target::reflect_shared(Arc::clone(&counter)));
        let text = d.invoke(Some("toString"), Value::Null).await.unwrap();
        assert_eq!(text, Value::from("Counter(3)"));
        let hash = d.invoke(Some("hashCode"), Value::Null).await.unwrap();
        assert_eq!(hash, Value::Int(Identity::of(&*counter).hash_code() as i64));
    }

    #[test]
    fn test_identity_delegates_to_target() {
        let counter = Arc::new(Counter::new());
        let a = Dispatcher::new(Target::reflect_shared(Arc::clone(&counter)));
        let b = Dispatcher::new(Target::reflect_shared(Arc::clone(&counter)));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.to_string(), b.to_string());

        // Wrapper and raw target agree.
        assert_eq!(a.identity(), Identity::of(&*counter));
        assert_eq!(a.to_string(), counter.to_string());

        let c = Dispatcher::reflect(Counter::new());
        assert_ne!(a, c);
    }

    #[test]
    fn test_native_identity_delegates() {
        let raw: Arc<dyn Invoke> = Arc::new(Recorder);
        let a = Dispatcher::new(Target::native(Arc::clone(&raw)));
        let b = Dispatcher::new(Target::native(Arc::clone(&raw)));
        assert_eq!(a, b);
        assert_eq!(a.identity(), raw.identity());
        assert_eq!(a.to_string(), "recorder");
    }

    #[tokio::test]
    async fn test_concurrent_calls() {
        let counter = Arc::new(Counter::new());
        let d = Arc::new(Dispatcher::new(Target::reflect_shared(Arc::clone(&counter))));
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let d = Arc::clone(&d);
            tasks.push(tokio::spawn(async move {
                d.invoke(Some("add"), Value::from(1)).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(counter.total.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_table_contains() {
        let table = Counter::methods();
        assert!(table.contains("add", &[ValueType::Int]));
        assert!(!table.contains("add", &[ValueType::Float]));
        assert_eq!(table.len(), 6);
    }
}
