use std::sync::Arc;

use common::context::Context;

use crate::auth::AccessTokenBuilder;
use crate::config::AppConfig;
use crate::service::RecordingService;

pub struct GlobalState {
    pub config: AppConfig,
    pub ctx: Context,
    pub auth: AccessTokenBuilder,
    pub service: Arc<RecordingService>,
}

impl GlobalState {
    pub fn new(
        config: AppConfig,
        ctx: Context,
        auth: AccessTokenBuilder,
        service: Arc<RecordingService>,
    ) -> Self {
        Self {
            config,
            ctx,
            auth,
            service,
        }
    }
}
