use crate::provider::CodeSource;
use crate::store::{CodeStore, FetchResult};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// The inter-page message contract. Pages cannot call each other directly;
/// everything goes through the coordinating store service.
#[derive(Debug, Clone)]
pub enum Request {
    PublishCode { code: String, source: CodeSource },
    GetCurrentCode,
    MarkConsumed,
    RequestImmediateRescan,
}

#[derive(Debug, Clone)]
pub enum Response {
    Published(bool),
    Current(FetchResult),
    Consumed,
    RescanRequested,
}

/// Broadcast to every subscribed page.
#[derive(Debug, Clone)]
pub enum Signal {
    /// A new code was stored; target pages should attempt a fill.
    NewCode(String),
    /// The user asked the email page to rescan right now.
    Rescan,
}

type Envelope = (Request, oneshot::Sender<Response>);

/// Owns the [`CodeStore`] and serializes access to it, like the background
/// process the tabs talk to. Dropping all clients (or aborting the handle)
/// models that process going away.
pub struct StoreService;

impl StoreService {
    pub fn spawn(store: CodeStore) -> (StoreClient, JoinHandle<CodeStore>) {
        let (tx, rx) = mpsc::channel::<Envelope>(32);
        let (signals, _) = broadcast::channel(16);
        let client = StoreClient {
            tx,
            signals: signals.clone(),
        };
        let handle = tokio::spawn(service_loop(store, rx, signals));
        (client, handle)
    }
}

async fn service_loop(
    mut store: CodeStore,
    mut rx: mpsc::Receiver<Envelope>,
    signals: broadcast::Sender<Signal>,
) -> CodeStore {
    while let Some((request, reply)) = rx.recv().await {
        let response = match request {
            Request::PublishCode { code, source } => {
                let published = store.publish(&code, source);
                if published {
                    // Subscriber lag or absence is fine; fills are best-effort.
                    let _ = signals.send(Signal::NewCode(code));
                }
                Response::Published(published)
            }
            Request::GetCurrentCode => Response::Current(store.fetch_current()),
            Request::MarkConsumed => {
                store.consume();
                Response::Consumed
            }
            Request::RequestImmediateRescan => {
                let _ = signals.send(Signal::Rescan);
                Response::RescanRequested
            }
        };
        // A caller that went away mid-call is not our problem.
        let _ = reply.send(response);
    }
    store
}

/// Async call surface held by each page. Every failure mode of the transport
/// degrades to "no code available" rather than an error: the coordinating
/// process can be reloaded out from under open tabs at any time.
#[derive(Clone)]
pub struct StoreClient {
    tx: mpsc::Sender<Envelope>,
    signals: broadcast::Sender<Signal>,
}

impl StoreClient {
    async fn call(&self, request: Request) -> Option<Response> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send((request, reply_tx)).await.is_err() {
            log::debug!("store transport unavailable, treating as empty");
            return None;
        }
        match reply_rx.await {
            Ok(response) => Some(response),
            Err(_) => {
                log::debug!("store went away mid-call, treating as empty");
                None
            }
        }
    }

    pub async fn publish_code(&self, code: &str, source: CodeSource) -> bool {
        matches!(
            self.call(Request::PublishCode {
                code: code.to_string(),
                source,
            })
            .await,
            Some(Response::Published(true))
        )
    }

    pub async fn get_current_code(&self) -> FetchResult {
        match self.call(Request::GetCurrentCode).await {
            Some(Response::Current(result)) => result,
            _ => FetchResult::unavailable(),
        }
    }

    pub async fn mark_consumed(&self) {
        let _ = self.call(Request::MarkConsumed).await;
    }

    pub async fn request_immediate_rescan(&self) {
        let _ = self.call(Request::RequestImmediateRescan).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }
}
