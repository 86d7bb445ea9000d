mod assessment;
mod auth;
mod db;
mod interviews;
mod livesession;
mod util;

use std::sync::Arc;
use std::time::Duration;

pub use assessment::*;
pub use auth::*;
pub use db::*;
pub use interviews::*;
pub use livesession::*;
pub use util::*;

/// The greenroom platform core, facilitating identity lifecycle, interview
/// analysis, and live session reclamation.
pub struct Greenroom<Db, G> {
    pub auth: Auth<Db>,
    pub interviews: Interviews<Db>,
    pub sessions: LiveSessions<G>,
}

/// Top-level configuration for the platform core
#[derive(Debug, Clone)]
pub struct GreenroomConfig {
    pub auth: AuthConfig,
    /// How long a live room may outlive its session before reclamation
    pub room_ttl: Duration,
}

impl GreenroomConfig {
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            auth,
            room_ttl: DEFAULT_ROOM_TTL,
        }
    }
}

impl<Db, G> Greenroom<Db, G>
where
    Db: Database,
    G: LiveSessionGateway,
{
    /// Wires up the platform. Must be called from within a tokio runtime,
    /// since the interview orchestrator spawns its worker pool here.
    pub fn new<E>(config: GreenroomConfig, database: Db, engine: E, gateway: G) -> Self
    where
        E: AssessmentEngine,
    {
        let database = Arc::new(database);
        let engine = Arc::new(engine);
        let gateway = Arc::new(gateway);

        let timers = RoomTimers::new(&gateway, config.room_ttl);

        Self {
            auth: Auth::new(&database, config.auth),
            interviews: Interviews::new(&database, &engine, &timers),
            sessions: LiveSessions::new(&gateway, &timers),
        }
    }
}
