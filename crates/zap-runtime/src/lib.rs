//! Core runtime for the Zap deletion bot: trigger detection, candidate
//! retrieval, the budgeted deletion engine, and supervision of the
//! per-account real-time listeners.

pub mod deletion;
pub mod history;
pub mod listener;
pub mod supervisor;
pub mod trigger;

pub use deletion::{delete_up_to, NewestFirst};
pub use listener::{run_account_listener, AccountListenerConfig, TriggerEvent};
pub use supervisor::{
    AccountPresence, ListenerLauncher, ListenerSupervisor, RtmListenerLauncher,
};
