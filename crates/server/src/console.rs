use crate::actor::Msg;
use anyhow::{Context, Result};
use depsweep_protocol::ConsoleRequest;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// Accept operator console connections forever. Each session becomes a pair
/// of tasks: a reader that turns incoming frames into [`Msg::Command`]s and
/// a writer that drains the session's outgoing queue. The actor owns the
/// sending half through its client registry, so dropping the session there
/// ends the writer.
pub async fn run_console(listener: TcpListener, tx: mpsc::UnboundedSender<Msg>) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("accept console connection")?;
        log::debug!("console connection from {peer}");
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_session(stream, tx).await {
                log::debug!("console session ended: {err:#}");
            }
        });
    }
}

async fn handle_session(stream: TcpStream, tx: mpsc::UnboundedSender<Msg>) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket handshake")?;
    let session = Uuid::new_v4();
    let (mut sink, mut source) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    tx.send(Msg::ClientConnected {
        session,
        sender: out_tx,
    })
    .ok();

    let writer = tokio::spawn(async move {
        while let Some(response) = out_rx.recv().await {
            let payload = match serde_json::to_string(&response) {
                Ok(payload) => payload,
                Err(err) => {
                    log::error!("failed to encode console response: {err}");
                    continue;
                }
            };
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = source.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(_) => break,
        };
        match frame {
            Message::Text(raw) => match serde_json::from_str::<ConsoleRequest>(&raw) {
                Ok(request) => {
                    tx.send(Msg::Command { session, request }).ok();
                }
                Err(err) => log::warn!("console session {session}: bad request ({err})"),
            },
            Message::Close(_) => break,
            // Pings are answered by the protocol layer; binary frames have
            // no meaning on this console.
            _ => {}
        }
    }

    tx.send(Msg::ClientDisconnected { session }).ok();
    writer.abort();
    Ok(())
}
