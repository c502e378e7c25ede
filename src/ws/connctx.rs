use tokio::sync::mpsc;

/// Identity vouched for by the authenticated session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub user_name: String,
}

/// One live socket and the folder room it currently sits in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnCtx {
    pub connection_id: String,
    pub user_id: String,
    pub user_name: String,
    pub folder_id: Option<String>,
}

/// Sending half of a connection's writer queue.
///
/// A send fails once the socket writer task has gone away, which is how the
/// broadcaster detects stale connections.
#[derive(Clone, Debug)]
pub struct Outbox(mpsc::UnboundedSender<String>);

impl Outbox {
    pub fn channel() -> (Outbox, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbox(tx), rx)
    }

    pub fn send(&self, text: String) -> bool {
        self.0.send(text).is_ok()
    }
}
