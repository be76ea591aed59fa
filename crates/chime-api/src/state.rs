use std::sync::Arc;

use chime_db::Store;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Arc<dyn Store>,
}
