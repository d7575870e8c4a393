use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tracing::debug;

use crate::codec::BodyBuf;
use crate::error::MethodError;
use crate::{MessageHeader, ObjectPath};

use super::shared::Shared;

/// A signal callback, invoked with the header of the signal and the raw
/// bytes of its body.
pub(crate) type SignalHandler = dyn Fn(&MessageHeader, &[u8]) + Send + Sync;

/// The boxed future returned by a method call handler.
pub(crate) type MethodFuture =
    Pin<Box<dyn Future<Output = Result<BodyBuf, MethodError>> + Send>>;

/// A method call handler, invoked with the header of the call and the raw
/// bytes of its body. The returned body is sent back as a method return, and
/// a [`MethodError`] produces an error reply.
pub(crate) type MethodHandler =
    dyn Fn(Arc<MessageHeader>, Vec<u8>) -> MethodFuture + Send + Sync;

/// Registered handlers, indexed by the header fields which select them.
#[derive(Default)]
pub(crate) struct Handlers {
    /// Signal handlers by path, interface and member, in registration order.
    pub(crate) signals: HashMap<String, Vec<(u64, Arc<SignalHandler>)>>,
    /// Method call handlers by path and interface.
    pub(crate) objects: HashMap<String, Arc<MethodHandler>>,
    /// Identifier for the next signal handler registration.
    pub(crate) next_id: u64,
}

/// The registry key selecting a signal handler.
pub(crate) fn signal_key(path: &ObjectPath, interface: &str, member: &str) -> String {
    format!("{path}\0{interface}\0{member}")
}

/// The registry key selecting a method call handler.
pub(crate) fn object_key(path: &ObjectPath, interface: &str) -> String {
    format!("{path}\0{interface}")
}

/// Remove the signal handler registered under `key` with the given
/// identifier, leaving other handlers under the same key in place.
pub(crate) fn remove_signal(handlers: &mut Handlers, key: &str, id: u64) {
    let Some(list) = handlers.signals.get_mut(key) else {
        return;
    };

    list.retain(|(entry, _)| *entry != id);

    if list.is_empty() {
        handlers.signals.remove(key);
    }
}

/// Keeps a handler registered for as long as it is held.
///
/// Dropping the registration removes the handler it was returned for, and
/// for signal handlers asks the message bus to stop routing the matching
/// signals here.
#[must_use = "dropping the registration removes the handler"]
pub struct Registration {
    shared: Weak<Shared>,
    kind: Kind,
}

enum Kind {
    Signal { key: String, id: u64, rule: String },
    Object { key: String },
}

impl Registration {
    pub(crate) fn signal(shared: Weak<Shared>, key: String, id: u64, rule: String) -> Self {
        Self {
            shared,
            kind: Kind::Signal { key, id, rule },
        }
    }

    pub(crate) fn object(shared: Weak<Shared>, key: String) -> Self {
        Self {
            shared,
            kind: Kind::Object { key },
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        match &self.kind {
            Kind::Signal { key, id, rule } => {
                remove_signal(&mut shared.handlers(), key, *id);

                // The bus is only told when connected to one, and only a
                // runtime can deliver the message.
                if shared.unique_name().is_some() {
                    if let Ok(handle) = Handle::try_current() {
                        let rule = rule.clone();

                        handle.spawn(async move {
                            if let Err(error) = shared.remove_match(&rule).await {
                                debug!(%error, "failed to remove match rule");
                            }
                        });
                    }
                }
            }
            Kind::Object { key } => {
                shared.handlers().objects.remove(key);
            }
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("Registration");

        match &self.kind {
            Kind::Signal { key, id, .. } => f.field("signal", key).field("id", id),
            Kind::Object { key } => f.field("object", key),
        }
        .finish()
    }
}
