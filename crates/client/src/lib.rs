//! stackboard client
//!
//! Everything a board front end needs besides rendering: the local copy
//! of the board, drag-and-drop resolution, the sync channel client and
//! the controller that ties optimistic updates to the persistence API.

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod notice;
pub mod resolver;
pub mod store;
pub mod sync;

pub use api::{HttpApi, PersistenceApi};
pub use config::{ClientConfig, ReconnectPolicy};
pub use controller::{BoardController, CommitHandle, CommitOutcome};
pub use error::{ClientError, ClientResult};
pub use notice::{Notice, NoticeBoard};
pub use resolver::{resolve, Dragged, DropTarget, Gesture};
pub use store::{shared, BoardView, LocalStore, SharedStore};
pub use sync::{apply_server_event, Presence, SyncClient, SyncSender, SyncStatus};
