//! Downstream consumers of delivered payloads

use tokio::sync::mpsc;

/// Downstream consumer of transformed file contents
///
/// `receive` is called synchronously from the tick, once per delivered file.
/// The payload is handed over by value; nothing is reported back.
pub trait Sink: Send + Sync {
    /// Accept one payload
    ///
    /// `context` is the remote file name the payload came from.
    fn receive(&self, payload: Vec<u8>, context: &str);
}

/// A payload delivered through [`ChannelSink`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Remote file name the payload came from
    pub context: String,
    /// File contents after line stripping
    pub payload: Vec<u8>,
}

/// Sink that forwards payloads into an unbounded channel
///
/// Lets async consumers pull deliveries without blocking the tick. A closed
/// receiver drops payloads with a warning.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn receive(&self, payload: Vec<u8>, context: &str) {
        let delivery = Delivery {
            context: context.to_string(),
            payload,
        };
        if self.tx.send(delivery).is_err() {
            tracing::warn!(file = %context, "Sink receiver closed, payload dropped");
        }
    }
}
