//! `conch-hooks` — the shell's event bus.
//!
//! Native subsystems and script handlers subscribe to named events ("hooks")
//! and react when they are emitted. Delivery is synchronous and in
//! registration order; each listener runs behind its own fault boundary.
//!
//! # Failure handling
//!
//! | Failure                                   | Outcome                                        |
//! |-------------------------------------------|------------------------------------------------|
//! | script listener errors on event `E`       | `error` is emitted with `(E, listener, message)` |
//! | script listener for `error` itself errors | [`ListenerFault`] sent to the recoverer        |
//! | any listener panics                       | [`ListenerFault`] sent to the recoverer        |
//! | fault with no recoverer installed         | re-raised as a panic                           |

pub mod bus;
pub mod error;
pub mod module;
pub mod types;

pub use bus::EventBus;
pub use error::{HookError, Result};
pub use module::BaitModule;
pub use types::{
    FaultKind, Handler, Listener, ListenerFault, ListenerKind, ListenerRef, NativeHandler,
    Recoverer, ERROR_EVENT,
};
