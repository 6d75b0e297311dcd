//! Perks Engine - loyalty stamp workflow engine
//!
//! # Architecture Overview
//!
//! The engine is the logic layer of a multi-tenant loyalty-card platform.
//! All persistence and business-rule enforcement live in a hosted backend;
//! the engine owns everything between the UI and that boundary:
//!
//! - **Ledger client** (`ledger`): the sole I/O boundary for stamp/redeem
//!   invocations, analytics snapshots and row reads
//! - **Action state machine** (`actions`): per-(card, action) lifecycle
//!   with a short undo window after each success
//! - **Reconciler** (`reconciler`): roster view state; displayed counts are
//!   only ever server-confirmed values
//! - **Realtime** (`realtime`): channel transport, presence synchronization
//!   and stamp-update merging for the live dashboard
//! - **Sessions** (`dashboard`, `card`): operator- and customer-facing
//!   workflows composed from the parts above
//!
//! # Module Structure
//!
//! ```text
//! perks-engine/src/
//! ├── core/          # configuration
//! ├── utils/         # errors, logging
//! ├── ledger/        # remote ledger client (HTTP + in-process)
//! ├── actions/       # action state machine / undo windows
//! ├── reconciler/    # roster view state
//! ├── realtime/      # transport, memory hub, presence synchronizer
//! ├── dashboard/     # store operator session
//! ├── card/          # customer card session
//! ├── session.rs     # role resolver
//! └── tasks/         # background task registry
//! ```

pub mod actions;
pub mod card;
pub mod core;
pub mod dashboard;
pub mod ledger;
pub mod realtime;
pub mod reconciler;
pub mod session;
pub mod tasks;
pub mod utils;

// Re-export public types
pub use card::CardSession;
pub use crate::core::Config;
pub use dashboard::{DashboardSession, StoreContext};
pub use ledger::{FunctionsClient, LedgerClient, LedgerError, MemoryLedger};
pub use realtime::{MemoryHub, PresenceSynchronizer, RealtimeTransport, Subscription};
pub use session::{AuthUser, Role, resolve_role};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
