use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use std::time::Instant;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub data: String,
    pub timestamp: Instant,
}

pub struct Connection {
    event_rx: mpsc::UnboundedReceiver<Event>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub async fn establish(base_url: &str, last_event_id: Option<&str>) -> Result<Self> {
        let url = format!("{}/events", base_url);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut builder = es::ClientBuilder::for_url(&url)?;
        if let Some(id) = last_event_id {
            builder = builder.header("Last-Event-ID", id)?;
        }
        let client = builder.build();

        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => {
                        let event = Event {
                            event_type: event.event_type,
                            data: event.data,
                            timestamp: Instant::now(),
                        };
                        if tx.send(event).is_err() {
                            debug!("SSE receiver dropped");
                            break;
                        }
                    }
                    Some(Ok(es::SSE::Comment(comment))) => {
                        debug!("keep-alive comment: {comment}");
                    }
                    Some(Err(e)) => {
                        warn!("SSE error: {e}");
                    }
                    None => {
                        debug!("SSE stream ended");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            event_rx: rx,
            _handle: handle,
        })
    }

    /// Next event from the stream; `None` once the server hangs up.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.event_rx.recv().await
    }
}
