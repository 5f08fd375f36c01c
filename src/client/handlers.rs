//! Typed event dispatch and lifecycle callbacks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

type EventHandler = Arc<dyn Fn(&[Value]) -> Result<(), serde_json::Error> + Send + Sync>;

/// Event name → handlers, invoked in registration order.
///
/// Each entry decodes the positional arguments into the type chosen at
/// registration, so `on::<(i64, String), _>` receives a decoded tuple.
#[derive(Default)]
pub struct HandlerTable {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<Args, F>(&self, event: impl Into<String>, handler: F)
    where
        Args: DeserializeOwned,
        F: Fn(Args) + Send + Sync + 'static,
    {
        let entry: EventHandler = Arc::new(move |arguments: &[Value]| {
            let args: Args = serde_json::from_value(Value::Array(arguments.to_vec()))?;
            handler(args);
            Ok(())
        });

        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(event.into())
            .or_default()
            .push(entry);
    }

    /// Run every handler for `event`; returns how many accepted the payload.
    ///
    /// A payload a handler cannot decode is dropped for that handler only.
    pub fn dispatch(&self, event: &str, arguments: &[Value]) -> usize {
        let handlers = {
            let table = self
                .handlers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match table.get(event) {
                Some(handlers) => handlers.clone(),
                None => {
                    tracing::trace!(event = %event, "No handler registered");
                    return 0;
                }
            }
        };

        let mut handled = 0;
        for handler in handlers {
            match handler(arguments) {
                Ok(()) => handled += 1,
                Err(e) => {
                    tracing::warn!(event = %event, error = %e, "Dropping undecodable event payload");
                }
            }
        }
        handled
    }
}

type ReasonCallback = Arc<dyn Fn(Option<&str>) + Send + Sync>;
type PlainCallback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks per lifecycle point, run synchronously in registration order
#[derive(Default)]
pub struct LifecycleCallbacks {
    reconnecting: RwLock<Vec<ReasonCallback>>,
    reconnected: RwLock<Vec<PlainCallback>>,
    closed: RwLock<Vec<ReasonCallback>>,
}

impl LifecycleCallbacks {
    pub fn on_reconnecting(&self, callback: impl Fn(Option<&str>) + Send + Sync + 'static) {
        push(&self.reconnecting, Arc::new(callback));
    }

    pub fn on_reconnected(&self, callback: impl Fn() + Send + Sync + 'static) {
        push(&self.reconnected, Arc::new(callback));
    }

    pub fn on_closed(&self, callback: impl Fn(Option<&str>) + Send + Sync + 'static) {
        push(&self.closed, Arc::new(callback));
    }

    pub fn fire_reconnecting(&self, reason: Option<&str>) {
        for callback in snapshot(&self.reconnecting) {
            callback(reason);
        }
    }

    pub fn fire_reconnected(&self) {
        for callback in snapshot(&self.reconnected) {
            callback();
        }
    }

    pub fn fire_closed(&self, reason: Option<&str>) {
        for callback in snapshot(&self.closed) {
            callback(reason);
        }
    }
}

fn push<T>(list: &RwLock<Vec<T>>, item: T) {
    list.write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(item);
}

fn snapshot<T: Clone>(list: &RwLock<Vec<T>>) -> Vec<T> {
    list.read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_handlers_run_in_registration_order() {
        let table = HandlerTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            table.register("UserOnline", move |(user_id,): (String,)| {
                seen.lock().unwrap().push(format!("{}:{}", tag, user_id));
            });
        }

        assert_eq!(table.dispatch("UserOnline", &[json!("u1")]), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["first:u1", "second:u1"]);
    }

    #[test]
    fn test_multi_argument_decode() {
        let table = HandlerTable::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        table.register(
            "UserTypingInChannel",
            move |args: (i64, String, String, bool)| {
                *sink.lock().unwrap() = Some(args);
            },
        );

        table.dispatch(
            "UserTypingInChannel",
            &[json!(5), json!("u1"), json!("Ada"), json!(true)],
        );
        assert_eq!(
            *seen.lock().unwrap(),
            Some((5, "u1".to_string(), "Ada".to_string(), true))
        );
    }

    #[test]
    fn test_malformed_payload_is_dropped() {
        let table = HandlerTable::new();
        table.register("MessageRead", |_: (i64, i64, String)| {
            panic!("must not be called");
        });

        assert_eq!(table.dispatch("MessageRead", &[json!("not-a-number")]), 0);
        assert_eq!(table.dispatch("Unregistered", &[]), 0);
    }

    #[test]
    fn test_lifecycle_callbacks_fire_in_order() {
        let callbacks = LifecycleCallbacks::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        callbacks.on_reconnecting(move |reason| {
            l.lock().unwrap().push(format!("reconnecting:{}", reason.unwrap_or("-")))
        });
        let l = log.clone();
        callbacks.on_reconnected(move || l.lock().unwrap().push("reconnected".to_string()));

        callbacks.fire_reconnecting(Some("timeout"));
        callbacks.fire_reconnected();
        callbacks.fire_closed(None);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["reconnecting:timeout", "reconnected"]
        );
    }
}
