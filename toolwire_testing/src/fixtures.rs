//! Session and host fixtures.

use std::{
    future::Future,
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
    time::Duration,
};

use rstest::fixture;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use toolwire::{
    dispatch::RequestHandler,
    host::ToolHost,
    session::{Role, Session, SilentWireObserver},
    tools::Sandbox,
    transport,
};

use crate::RawPeer;

const DUPLEX_CAPACITY: usize = 64 * 1024;
const MAX_FRAME: usize = 1 << 20;

/// Bind a TCP listener to a free localhost port.
///
/// # Panics
///
/// Panics if no port can be bound.
#[fixture]
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("bind free port")
}

/// Spawn an acceptor session running `handler` and return a raw peer wired
/// to it.
///
/// Must be called from within a Tokio runtime.
#[must_use]
pub fn acceptor_with_peer(handler: Arc<dyn RequestHandler>) -> (Session, RawPeer) {
    let (ours, theirs) = tokio::io::duplex(DUPLEX_CAPACITY);
    let session = Session::builder(Role::Acceptor)
        .request_handler(handler)
        .observer(Arc::new(SilentWireObserver))
        .spawn(transport::framed(ours, MAX_FRAME));
    (session, RawPeer::new(theirs))
}

/// Spawn an acceptor and a dialer connected to each other.
///
/// The dialer is left `Connecting`; it can send requests straight away.
#[must_use]
pub fn session_pair(
    acceptor: Arc<dyn RequestHandler>,
    dialer: Arc<dyn RequestHandler>,
) -> (Session, Session) {
    let (left, right) = tokio::io::duplex(DUPLEX_CAPACITY);
    let server = Session::builder(Role::Acceptor)
        .request_handler(acceptor)
        .observer(Arc::new(SilentWireObserver))
        .spawn(transport::framed(left, MAX_FRAME));
    let client = Session::builder(Role::Dialer)
        .request_handler(dialer)
        .observer(Arc::new(SilentWireObserver))
        .spawn(transport::framed(right, MAX_FRAME));
    (server, client)
}

/// A file tool host rooted in a temporary directory.
pub struct FileHost {
    pub dir: TempDir,
    pub sandbox: Sandbox,
    pub host: ToolHost,
}

impl FileHost {
    /// Absolute path of `relative` inside the sandbox.
    #[must_use]
    pub fn path(&self, relative: &str) -> std::path::PathBuf { self.sandbox.base().join(relative) }

    /// The host as a request handler.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn RequestHandler> { Arc::new(self.host.clone()) }
}

/// Create a [`FileHost`] over a fresh temporary directory.
///
/// # Panics
///
/// Panics if the directory cannot be created.
#[fixture]
pub fn file_host() -> FileHost {
    let dir = tempfile::tempdir().expect("tempdir");
    let sandbox = Sandbox::open(dir.path()).expect("sandbox");
    let host = ToolHost::new().with_file_tools(&sandbox);
    FileHost { dir, sandbox, host }
}

/// Poll `condition` every few milliseconds until it holds or five seconds
/// pass. Returns whether it held.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Await `fut` for at most five seconds.
///
/// # Panics
///
/// Panics if `fut` does not finish in time.
pub async fn within<F: Future>(fut: F) -> F::Output {
    timeout(Duration::from_secs(5), fut)
        .await
        .expect("future did not finish in time")
}
