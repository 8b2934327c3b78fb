use std::sync::Arc;

use crate::auth::Authenticator;
use crate::lifecycle::MessageService;

pub type AppState = Arc<AppStateInner>;

/// Everything handlers need, built once at startup and shared.
pub struct AppStateInner {
    pub auth: Authenticator,
    pub messages: MessageService,
}
