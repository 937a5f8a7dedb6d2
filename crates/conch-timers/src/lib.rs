//! `conch-timers` — interval and timeout callbacks for scripts.
//!
//! Every started [`Timer`] runs on its own Tokio task and fires its script
//! callback through the engine call queue. The [`TimerScheduler`] keeps a
//! running-count the shell waits on at shutdown.
//!
//! | Kind       | Behaviour                                             |
//! |------------|-------------------------------------------------------|
//! | `Interval` | fires every `duration` until stopped or it errors     |
//! | `Timeout`  | fires once after `duration`, then stops itself        |

pub mod error;
pub mod handle;
pub mod module;
pub mod scheduler;
pub mod timer;
pub mod types;

pub use error::{Result, TimerError};
pub use handle::TimerHandle;
pub use module::TimersModule;
pub use scheduler::TimerScheduler;
pub use timer::Timer;
pub use types::{TimerInfo, TimerKind};
