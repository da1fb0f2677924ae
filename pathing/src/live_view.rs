//! # Live view server
//!
//! Streams real-time robot pose telemetry to the path visualizer. A TCP
//! listener accepts any number of clients and sends each one a single JSON
//! object per line every 50 ms:
//!
//! ```json
//! {"x":12.3400, "y":56.7800, "heading":1.5708}
//! ```
//!
//! The server runs on its own I/O threads; the control thread publishes
//! pose snapshots through a swappable supplier. Starting is idempotent, and
//! [`LiveView::disable`] clears the supplier without stopping the listener,
//! so the server safely outlives an operating mode whose hardware has been
//! shut down.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use conquer_once::OnceCell;
use log::{debug, info, warn};

use crate::chain::Pose;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static INSTANCE: OnceCell<LiveView> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Port the visualizer connects to.
pub const LIVE_VIEW_PORT: u16 = 8888;

/// Interval between telemetry lines on each connection.
const UPDATE_INTERVAL: Duration = Duration::from_millis(50);

/// Poll interval of the non-blocking accept loop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

type PoseSupplier = Box<dyn Fn() -> Pose + Send + Sync>;

/// The live-view telemetry server.
pub struct LiveView {
    port: u16,
    bound_port: RwLock<Option<u16>>,
    running: Arc<AtomicBool>,
    supplier: Arc<RwLock<Option<PoseSupplier>>>,
}

/// A shared pose snapshot bridging the control thread and the server's I/O
/// threads. The control loop stores the follower's pose once per cycle; the
/// server reads the latest snapshot whenever it sends.
#[derive(Clone)]
pub struct PoseCell(Arc<RwLock<Pose>>);

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The process-wide live view on the default port.
pub fn instance() -> &'static LiveView {
    let _ = INSTANCE.try_init_once(|| LiveView::new(LIVE_VIEW_PORT));
    match INSTANCE.get() {
        Some(view) => view,
        None => panic!("Cannot get the live view instance!"),
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LiveView {
    /// Create a server for the given port. Port 0 binds an ephemeral port,
    /// readable from [`LiveView::local_port`] after start.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            bound_port: RwLock::new(None),
            running: Arc::new(AtomicBool::new(false)),
            supplier: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the listener thread if it is not already running. Idempotent.
    pub fn start(&self) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let listener = match TcpListener::bind(("0.0.0.0", self.port)) {
            Ok(l) => l,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        listener.set_nonblocking(true)?;

        let port = listener.local_addr()?.port();
        *self.bound_port.write().unwrap() = Some(port);
        info!("Live view listening on port {}", port);

        let running = self.running.clone();
        let supplier = self.supplier.clone();

        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((client, addr)) => {
                        debug!("Live view client connected: {}", addr);
                        let running = running.clone();
                        let supplier = supplier.clone();
                        thread::spawn(move || serve_client(client, running, supplier));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(ACCEPT_POLL_INTERVAL);
                    }
                    Err(e) => {
                        if running.load(Ordering::SeqCst) {
                            warn!("Live view accept error: {}", e);
                        }
                        thread::sleep(ACCEPT_POLL_INTERVAL);
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop the listener and let client threads drain. Usually not needed;
    /// the server is designed to persist across operating modes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        *self.bound_port.write().unwrap() = None;
    }

    /// The port actually bound, once started.
    pub fn local_port(&self) -> Option<u16> {
        *self.bound_port.read().unwrap()
    }

    /// Install a pose supplier for the telemetry stream.
    pub fn set_pose_supplier(&self, supplier: impl Fn() -> Pose + Send + Sync + 'static) {
        *self.supplier.write().unwrap() = Some(Box::new(supplier));
    }

    /// Publish poses from a shared snapshot cell.
    pub fn set_pose_cell(&self, cell: &PoseCell) {
        let cell = cell.clone();
        self.set_pose_supplier(move || cell.load());
    }

    /// Clear the pose supplier without stopping the listener. Clients stay
    /// connected and receive nothing until a new supplier is installed.
    pub fn disable(&self) {
        *self.supplier.write().unwrap() = None;
    }
}

impl PoseCell {
    pub fn new(initial: Pose) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    /// Store the latest pose snapshot.
    pub fn store(&self, pose: Pose) {
        *self.0.write().unwrap() = pose;
    }

    /// Load the latest pose snapshot.
    pub fn load(&self) -> Pose {
        *self.0.read().unwrap()
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Stream telemetry lines to one client until it disconnects or the server
/// stops.
fn serve_client(
    mut client: TcpStream,
    running: Arc<AtomicBool>,
    supplier: Arc<RwLock<Option<PoseSupplier>>>,
) {
    while running.load(Ordering::SeqCst) {
        let line = {
            let guard = supplier.read().unwrap();
            match guard.as_ref() {
                Some(provider) => match catch_unwind(AssertUnwindSafe(|| provider())) {
                    Ok(pose) => Some(format!(
                        "{{\"x\":{:.4}, \"y\":{:.4}, \"heading\":{:.4}}}",
                        pose.x, pose.y, pose.heading_rad
                    )),
                    // A provider reaching into closed hardware must not
                    // take the stream down
                    Err(_) => Some(String::from("{\"error\": \"provider_error\"}")),
                },
                None => None,
            }
        };

        if let Some(line) = line {
            if writeln!(client, "{}", line).and_then(|_| client.flush()).is_err() {
                break;
            }
        }

        thread::sleep(UPDATE_INTERVAL);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{BufRead, BufReader};

    #[test]
    fn test_streams_pose_lines() {
        let view = LiveView::new(0);
        view.start().unwrap();
        view.start().unwrap(); // idempotent

        let cell = PoseCell::new(Pose::new(12.5, 34.25, 1.5));
        view.set_pose_cell(&cell);

        let port = view.local_port().unwrap();
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).unwrap();

        assert_eq!(
            line.trim(),
            "{\"x\":12.5000, \"y\":34.2500, \"heading\":1.5000}"
        );

        view.stop();
    }

    #[test]
    fn test_provider_error_is_reported() {
        let view = LiveView::new(0);
        view.start().unwrap();
        view.set_pose_supplier(|| panic!("hardware is closed"));

        let port = view.local_port().unwrap();
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).unwrap();
        assert_eq!(line.trim(), "{\"error\": \"provider_error\"}");

        view.stop();
    }
}
