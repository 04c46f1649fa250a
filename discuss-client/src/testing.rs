use std::sync::Arc;

use discuss_mock_server::MockServer;

use crate::{
    api::{ContentId, SortMode, Viewer},
    EngineConfig, Session, ThreadRoot,
};

pub fn init_tracing() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt::try_init();
    }
}

pub fn setup() -> (Arc<MockServer>, Arc<Session>) {
    setup_with(EngineConfig::default())
}

pub fn setup_with(config: EngineConfig) -> (Arc<MockServer>, Arc<Session>) {
    init_tracing();
    let server = Arc::new(MockServer::new("viewer"));
    let session = Session::new(
        server.clone(),
        server.clone(),
        Viewer::member(server.viewer().id),
        config,
    );
    (server, session)
}

/// A thread for the stub content item, with its first page loaded
pub async fn loaded_root(session: &Arc<Session>) -> Arc<ThreadRoot> {
    let root = ThreadRoot::new(session.clone(), ContentId::stub(), SortMode::Oldest);
    root.load_page(1).await.expect("loading first page");
    root
}
