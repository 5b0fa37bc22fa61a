//! Tilecascade: falling-tile connection-matching puzzle engine.
//!
//! Pairs of coloured tiles fall into a grid. Same-coloured neighbours connect,
//! groups at or above the minimum match size clear, and tiles that lose their
//! support cascade down until the grid settles and the next pair spawns.

pub mod ai;
pub mod board;
pub mod engine;
pub mod events;
pub mod geometry;
pub mod logging;
pub mod matching;
pub mod session;
pub mod settings;
pub mod spawn;
pub mod tile;

pub use engine::{Controller, GridEngine, GridStatus, IntentKind, Phase};
pub use events::{ChangeReason, EventBus, GridEvent, GridFilter, GridId};
pub use geometry::{ConnectionMask, Direction, GridCoord};
pub use session::{GameMode, Intent, MatchOutcome, Session, SessionError};
pub use settings::{GameSettings, SettingsError};
pub use tile::{Shift, TileColor, TileId};
