use commonware_runtime::{Clock, Metrics, Sink, Spawner, Stream};
use deskwire_stream::frame::{recv_frame, send_frame};
use futures::{
    channel::oneshot,
    future::{AbortHandle, AbortRegistration, Abortable, Aborted},
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime},
};
use tracing::{debug, info};

/// Fires at most once, when a transport failure ends the session. Owner-
/// initiated [Session::stop] does not fire it; the sender is dropped
/// instead.
pub type Finished = oneshot::Receiver<()>;

/// Configuration for a relay session.
#[derive(Clone, Copy)]
pub struct Config {
    /// Largest frame accepted from either side.
    pub max_frame_size: usize,
}

struct Shared {
    /// Cumulative payload bytes read across both directions.
    bytes: AtomicU64,
    notifier: Mutex<Option<oneshot::Sender<()>>>,
}

impl Shared {
    fn notify(&self) {
        if let Some(notifier) = self.notifier.lock().unwrap().take() {
            let _ = notifier.send(());
        }
    }
}

/// Forwards frames between two transports until either side fails or the
/// owner calls [Session::stop].
///
/// Each direction is a self-restarting loop with at most one outstanding
/// read and one outstanding write: no frame is read from a side until the
/// previous frame has been written to the other, which bounds memory to two
/// frames and applies backpressure end to end. Frame order is preserved
/// within each direction.
pub struct Session<E: Spawner + Metrics + Clock, Si: Sink, St: Stream> {
    context: E,
    config: Config,
    transports: Option<[(Si, St); 2]>,
    aborts: [AbortHandle; 2],
    registrations: Option<[AbortRegistration; 2]>,
    shared: Arc<Shared>,
    started: Option<SystemTime>,
}

impl<E: Spawner + Metrics + Clock, Si: Sink, St: Stream> Session<E, Si, St> {
    /// Create a session over two admitted transports.
    pub fn new(context: E, transports: [(Si, St); 2], config: Config) -> (Self, Finished) {
        let (notifier, finished) = oneshot::channel();
        let (abort_0, registration_0) = AbortHandle::new_pair();
        let (abort_1, registration_1) = AbortHandle::new_pair();
        let session = Self {
            context,
            config,
            transports: Some(transports),
            aborts: [abort_0, abort_1],
            registrations: Some([registration_0, registration_1]),
            shared: Arc::new(Shared {
                bytes: AtomicU64::new(0),
                notifier: Mutex::new(Some(notifier)),
            }),
            started: None,
        };
        (session, finished)
    }

    /// Begin forwarding in both directions. Does nothing if already started.
    pub fn start(&mut self) {
        let (Some([side_0, side_1]), Some([registration_0, registration_1])) =
            (self.transports.take(), self.registrations.take())
        else {
            return;
        };
        info!("starting relay session");
        self.started = Some(self.context.current());

        let (sink_0, stream_0) = side_0;
        let (sink_1, stream_1) = side_1;
        let max_frame_size = self.config.max_frame_size;

        // Direction 0 reads from side 0 and writes to side 1; an error in
        // either direction aborts its sibling.
        self.context.with_label("forward").spawn({
            let shared = self.shared.clone();
            let sibling = self.aborts[1].clone();
            move |_| forward(stream_0, sink_1, max_frame_size, shared, registration_0, sibling)
        });
        self.context.with_label("forward").spawn({
            let shared = self.shared.clone();
            let sibling = self.aborts[0].clone();
            move |_| forward(stream_1, sink_0, max_frame_size, shared, registration_1, sibling)
        });
    }

    /// Tear the session down: both directions are cancelled and both
    /// transports dropped. Idempotent; does not fire [Finished].
    pub fn stop(&mut self) {
        for abort in &self.aborts {
            abort.abort();
        }
        // Not yet started: release the transports so both sides close.
        self.transports = None;
        self.registrations = None;
    }

    /// Time since [Session::start], zero before it.
    pub fn duration(&self) -> Duration {
        match self.started {
            Some(started) => self
                .context
                .current()
                .duration_since(started)
                .unwrap_or_default(),
            None => Duration::default(),
        }
    }

    /// Cumulative payload bytes read across both directions.
    pub fn bytes_transferred(&self) -> u64 {
        self.shared.bytes.load(Ordering::Relaxed)
    }
}

impl<E: Spawner + Metrics + Clock, Si: Sink, St: Stream> Drop for Session<E, Si, St> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn forward<Si: Sink, St: Stream>(
    mut stream: St,
    mut sink: Si,
    max_frame_size: usize,
    shared: Arc<Shared>,
    registration: AbortRegistration,
    sibling: AbortHandle,
) {
    let forwarding = async {
        loop {
            let frame = recv_frame(&mut stream, max_frame_size).await?;
            shared.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
            send_frame(&mut sink, &frame, max_frame_size).await?;
        }
    };
    let result: Result<Result<(), deskwire_stream::Error>, Aborted> =
        Abortable::new(forwarding, registration).await;
    match result {
        Ok(Err(err)) => {
            debug!(error = ?err, "relay transport failed");
            shared.notify();
            sibling.abort();
        }
        // Forwarding never completes on its own.
        Ok(Ok(())) => {}
        // Cancellation is the normal outcome of stop().
        Err(Aborted) => {}
    }
}
