//! Invocation monitor: a decorator that logs every call to its target.

use crate::dispatch::{Dispatcher, Target};
use crate::server::caller_addr;

use async_trait::async_trait;
use farcall_types::{Identity, Invoke, InvokeResult, RemoteRef, Value};
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};

/// Wraps a target and emits one `tracing` event per call, with the caller,
/// method, arguments, outcome, idle time since the previous call and busy
/// time of this one. Identity and string form are the target's.
pub struct Monitor {
    dispatcher: Dispatcher,
    last_call: Mutex<Instant>,
}

impl Monitor {
    pub fn new(target: Target) -> Self {
        Self {
            dispatcher: Dispatcher::new(target),
            last_call: Mutex::new(Instant::now()),
        }
    }
}

#[async_trait]
impl Invoke for Monitor {
    async fn invoke(&self, method: Option<&str>, args: Value) -> InvokeResult<Value> {
        let started = Instant::now();
        let idle_ms = {
            let mut last = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
            let idle = started.duration_since(*last);
            *last = started;
            idle.as_millis() as u64
        };
        let caller = caller_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "localhost".to_string());
        let method_name = method.unwrap_or("<none>").to_string();
        let args_text = args.to_string();

        let result = self.dispatcher.invoke(method, args).await;
        let busy_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(value) => info!(
                caller = %caller,
                item = %self.dispatcher,
                method = %method_name,
                args = %args_text,
                result = %value,
                idle_ms,
                busy_ms,
                "Item call"
            ),
            Err(e) => warn!(
                caller = %caller,
                item = %self.dispatcher,
                method = %method_name,
                args = %args_text,
                error = %e,
                idle_ms,
                busy_ms,
                "Item call failed"
            ),
        }
        result
    }

    fn identity(&self) -> Identity {
        self.dispatcher.identity()
    }

    fn remote_ref(&self) -> Option<RemoteRef> {
        self.dispatcher.remote_ref()
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dispatcher.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ArgsExt, MethodTable, Reflect};
    use farcall_types::{InvokeError, ValueType};
    use std::sync::Arc;

    struct Doubler;

    impl fmt::Display for Doubler {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("doubler")
        }
    }

    impl Reflect for Doubler {
        fn methods() -> MethodTable<Self> {
            MethodTable::<Self>::new().method("double", &[ValueType::Int], |_, args| {
                Ok(Value::Int(args.int_at(0)? * 2))
            })
        }
    }

    #[tokio::test]
    async fn test_monitor_is_transparent() {
        let target = Arc::new(Doubler);
        let monitor = Monitor::new(Target::reflect_shared(Arc::clone(&target)));

        assert_eq!(monitor.to_string(), "doubler");
        assert_eq!(monitor.identity(), Identity::of(&*target));
        assert_eq!(
            monitor.invoke(Some("double"), Value::from(21)).await.unwrap(),
            Value::Int(42)
        );
        let err = monitor.invoke(Some("triple"), Value::from(1)).await.unwrap_err();
        assert!(matches!(err, InvokeError::NoSuchMethod(_)));
        let err = monitor.invoke(None, Value::Null).await.unwrap_err();
        assert!(matches!(err, InvokeError::InvalidArgument(_)));
    }
}
