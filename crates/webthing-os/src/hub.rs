use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};

use indexmap::IndexMap;

use tokio::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, info, warn};

use webthing::message::ThingMessage;
use webthing::observer::ObserverToken;
use webthing::thing::Thing;
use webthing::thing_set::ThingSet;

// Default number of messages buffered for each connection.
pub(crate) const DEFAULT_SUBSCRIBER_BUFFER: usize = 32;

// The connections bound to a thing.
#[derive(Debug, Default)]
struct Channel {
    senders: Mutex<IndexMap<u64, Sender<Utf8Bytes>>>,
}

impl Channel {
    fn broadcast(&self, text: &Utf8Bytes) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, sender| match sender.try_send(text.clone()) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping subscriber {id}: {e}");
                    false
                }
            });
    }

    fn insert(&self, id: u64, sender: Sender<Utf8Bytes>) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);
    }

    fn remove(&self, id: u64) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&id);
    }

    fn len(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// The registry of `WebSocket` subscribers.
///
/// Every message produced by a thing is serialized once and pushed to each
/// connection bound to that thing. A connection whose buffer is full, or
/// which has gone away, is dropped without affecting the producer.
#[derive(Debug)]
pub struct SubscriptionHub {
    things: Vec<(Arc<Thing>, ObserverToken)>,
    channels: IndexMap<String, Arc<Channel>>,
    buffer: usize,
    next_id: AtomicU64,
}

impl SubscriptionHub {
    /// Creates a [`SubscriptionHub`] observing every thing of the set.
    ///
    /// `buffer` is the number of messages each connection can lag behind
    /// before being dropped.
    #[must_use]
    pub fn new(things: &ThingSet, buffer: usize) -> Self {
        let mut channels = IndexMap::new();
        let things = things
            .get_things()
            .iter()
            .map(|thing| {
                let channel = Arc::new(Channel::default());
                channels.insert(thing.href_prefix().to_owned(), Arc::clone(&channel));

                let token = thing.subscribe(move |message: &ThingMessage| {
                    match message.to_json() {
                        Ok(text) => channel.broadcast(&Utf8Bytes::from(text)),
                        Err(e) => warn!("Message not broadcast: {e}"),
                    }
                    Ok(())
                });
                (Arc::clone(thing), token)
            })
            .collect();

        Self {
            things,
            channels,
            buffer: buffer.max(1),
            next_id: AtomicU64::new(0),
        }
    }

    /// Binds a new connection to a thing.
    ///
    /// Returns [`None`] if the thing does not belong to the observed set.
    #[must_use]
    pub fn subscribe(&self, thing: &Thing) -> Option<Subscription> {
        let channel = self.channels.get(thing.href_prefix())?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer);
        channel.insert(id, sender);

        debug!("Subscriber {id} bound to thing `{}`", thing.id());
        Some(Subscription {
            id,
            receiver,
            channel: Arc::clone(channel),
        })
    }

    /// Returns the number of connections bound to a thing.
    #[must_use]
    pub fn subscribers(&self, thing: &Thing) -> usize {
        self.channels
            .get(thing.href_prefix())
            .map_or(0, |channel| channel.len())
    }
}

impl Drop for SubscriptionHub {
    fn drop(&mut self) {
        for (thing, token) in &self.things {
            thing.unsubscribe(*token);
        }
    }
}

/// A connection bound to a thing.
///
/// The connection is removed from the hub when dropped.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: Receiver<Utf8Bytes>,
    channel: Arc<Channel>,
}

impl Subscription {
    /// Waits for the next message.
    ///
    /// Returns [`None`] once the connection has been dropped by the hub and
    /// every buffered message has been received.
    pub async fn recv(&mut self) -> Option<Utf8Bytes> {
        self.receiver.recv().await
    }

    /// Returns the next buffered message, if any.
    pub fn try_recv(&mut self) -> Option<Utf8Bytes> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.channel.remove(self.id);
        debug!("Subscriber {} unbound", self.id);
    }
}

// Forwards every message of the subscription to the socket until either
// side goes away.
pub(crate) async fn handle_socket(mut socket: WebSocket, mut subscription: Subscription) {
    info!("WebSocket client {} connected", subscription.id);

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(text) = message else {
                    debug!("WebSocket client {} dropped by the hub", subscription.id);
                    return;
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    debug!("WebSocket client {} disconnected (send failed)", subscription.id);
                    return;
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client {} disconnected", subscription.id);
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client {} disconnected (pong failed)", subscription.id);
                            return;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("WebSocket client {} sent: {}", subscription.id, text.as_str());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!("WebSocket client {} sent {} bytes", subscription.id, data.len());
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket client {} error: {e}", subscription.id);
                        return;
                    }
                }
            }
        }
    }
}
