// # Signal-Backed Connectivity Source
//
// Channel-backed implementation of ConnectivitySource.
//
// ## Purpose
//
// Bridges an externally-delivered online/offline signal (a platform
// event, a UI toggle, a test harness) into the stream interface the sync
// engine consumes. The HTTP probe in `studyroom-net-http` is the
// self-contained alternative for hosts without such a signal.

use std::pin::Pin;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;

use crate::traits::{ConnectivityEvent, ConnectivitySource};
use crate::Error;

/// Connectivity source fed by a [`ConnectivityHandle`]
#[derive(Debug, Clone)]
pub struct SignalConnectivity {
    rx: watch::Receiver<bool>,
}

/// Writer side of a [`SignalConnectivity`] pair
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    tx: watch::Sender<bool>,
}

impl ConnectivityHandle {
    /// Report the current online/offline state. Repeated reports of the
    /// same state do not produce transition events.
    pub fn set_online(&self, online: bool) {
        self.tx.send_replace(online);
    }
}

/// Create a connected source/handle pair with the given initial state
pub fn signal_pair(initial_online: bool) -> (SignalConnectivity, ConnectivityHandle) {
    let (tx, rx) = watch::channel(initial_online);
    (SignalConnectivity { rx }, ConnectivityHandle { tx })
}

#[async_trait::async_trait]
impl ConnectivitySource for SignalConnectivity {
    async fn current(&self) -> Result<bool, Error> {
        Ok(*self.rx.borrow())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = ConnectivityEvent> + Send + 'static>> {
        let mut rx = self.rx.clone();
        let (tx, out_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut previous = *rx.borrow_and_update();

            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                if online == previous {
                    continue;
                }
                if tx
                    .send(ConnectivityEvent::new(online, Some(previous)))
                    .is_err()
                {
                    break;
                }
                previous = online;
            }
        });

        Box::pin(UnboundedReceiverStream::new(out_rx))
    }
}
