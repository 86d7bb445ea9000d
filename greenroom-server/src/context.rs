use std::sync::Arc;

use greenroom_core::{Greenroom, HttpLiveSessionGateway, PgDatabase};

/// The concrete platform the server runs against
pub type Platform = Greenroom<PgDatabase, HttpLiveSessionGateway>;

#[derive(Clone)]
pub struct ServerContext {
    pub greenroom: Arc<Platform>,
}
